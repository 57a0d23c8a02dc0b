pub mod atlas;
pub mod batch;
pub mod cancel;
pub mod cli;
pub mod convert;
pub mod ctx;
pub mod error;
pub mod io;
pub mod math;
pub mod modality;
pub mod pipeline;
pub mod qc;
pub mod segment;
pub mod subject;
pub mod taxonomy;
pub mod volume;

pub mod schema {
    pub mod v1;
}
