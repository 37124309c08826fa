pub mod mpmc_pipe;
pub mod offsets;

pub use mpmc_pipe::MpmcPipe;
pub use offsets::Offsets;
