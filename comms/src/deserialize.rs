use std::io;

pub trait Deserialize<'buf>: Sized {
    /// Decodes one message body from `buf`.
    ///
    /// The result may borrow bulk payloads directly from `buf`.
    ///
    /// # Arguments
    /// * `buf` - One complete message body, without the length header.
    ///
    /// # Returns
    /// A result object that returns `Self` on success or `io::Error` on failure.
    fn deserialize(buf: &'buf [u8]) -> io::Result<Self>;
}
