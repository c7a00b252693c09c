//! Records bound to a table descriptor

pub mod descriptor;
pub mod record;

pub use descriptor::ModelDescriptor;
pub use record::Record;
