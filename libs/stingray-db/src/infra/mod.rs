//! Infrastructure adapters

pub mod sea_orm_executor;
