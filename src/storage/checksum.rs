// Checksum utilities for segment and delta-file verification.
//
// Segment writers and binary readers use Adler-32, the rolling checksum
// carried across block boundaries in both the segment format and the push
// delta-file framing.

const ADLER32_MOD: u32 = 65521;

/// Incremental Adler-32, matching the rolling checksum binary readers keep
/// across block boundaries.
#[derive(Debug, Clone, Copy)]
pub struct Adler32 {
    a: u32,
    b: u32,
}

impl Default for Adler32 {
    fn default() -> Self {
        Self::new()
    }
}

impl Adler32 {
    pub fn new() -> Self {
        Self { a: 1, b: 0 }
    }

    pub fn update(&mut self, data: &[u8]) {
        let (mut a, mut b) = (self.a, self.b);
        for chunk in data.chunks(5552) {
            for &byte in chunk {
                a += byte as u32;
                b += a;
            }
            a %= ADLER32_MOD;
            b %= ADLER32_MOD;
        }
        self.a = a;
        self.b = b;
    }

    pub fn finish(&self) -> u32 {
        (self.b << 16) | self.a
    }
}

/// One-shot Adler-32 over a full buffer.
pub fn adler32(data: &[u8]) -> u32 {
    let mut checksum = Adler32::new();
    checksum.update(data);
    checksum.finish()
}
