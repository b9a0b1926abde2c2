//! Buffered socket I/O shared by the HTTP codec and the WebSocket session.

mod buf_reader;
mod buf_writer;
mod error;

pub use buf_reader::BufReader;
pub use buf_reader::DEFAULT_BUF_SIZE;
pub use buf_reader::MAX_CONSECUTIVE_EMPTY_READS;
pub use buf_reader::MIN_BUF_SIZE;
pub use buf_reader::ReadLine;
pub use buf_writer::BufWriter;
pub use error::BufError;
