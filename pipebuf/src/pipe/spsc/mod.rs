pub mod handles;
pub mod spsc_pipe;

pub use handles::{ SpscReader, SpscWriter };
pub use spsc_pipe::SpscPipe;
