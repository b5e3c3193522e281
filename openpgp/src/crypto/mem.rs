//! Memory protection and constant-time primitives.

use zeroize::Zeroizing;

/// Compares two byte strings in constant time.
///
/// The comparison runs over `max(a.len(), b.len())` bytes: both inputs
/// are copied into equally sized zero-padded buffers first, so neither
/// the position of the first difference nor the length of the stored
/// secret shows in the timing.  Length inequality fails the
/// comparison.
pub fn secure_eq(a: &[u8], b: &[u8]) -> bool {
    let n = a.len().max(b.len()).max(1);
    let mut pa = Zeroizing::new(vec![0u8; n]);
    let mut pb = Zeroizing::new(vec![0u8; n]);
    pa[..a.len()].copy_from_slice(a);
    pb[..b.len()].copy_from_slice(b);
    let equal = unsafe {
        memsec::memeq(pa.as_ptr(), pb.as_ptr(), n)
    };
    equal & (a.len() == b.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality() {
        assert!(secure_eq(b"", b""));
        assert!(secure_eq(b"123456", b"123456"));
        assert!(!secure_eq(b"123456", b"123457"));
        assert!(!secure_eq(b"123456", b"1234567"));
        assert!(!secure_eq(b"1234567", b"123456"));
        // Zero padding must not make a prefix pass.
        assert!(!secure_eq(b"123456\x00", b"123456"));
        assert!(!secure_eq(b"", b"\x00"));
    }
}
