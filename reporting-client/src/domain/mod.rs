pub mod microgrid;
pub mod query;
pub mod sample;
pub mod table;

pub use microgrid::{ComponentKind, ComponentRef, Metric, MicrogridDescriptor};
pub use query::QueryKey;
pub use sample::RawSample;
pub use table::{
    Column, ColumnKey, ComponentRow, ComponentTable, DerivedColumns, MasterRow, MasterTable,
    SourceBreakdown,
};
