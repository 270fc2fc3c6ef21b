pub trait Serialize<'a> {
    /// Serializes `self` into `buf`, optionally returning a borrowed tail.
    ///
    /// Header and small fields go into `buf`; a bulk payload that already
    /// lives in memory as bytes may be returned instead of copied, and the
    /// sender writes it after `buf`.
    ///
    /// # Arguments
    /// * `buf` - The destination for the copied part of the encoding.
    ///
    /// # Returns
    /// The zero-copy remainder of the encoding, if any.
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]>;
}
