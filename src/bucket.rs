/// A fixed-length run of flags, packed eight to a byte.
#[derive(Clone, Debug)]
pub(crate) struct Bucket {
    bits: Box<[u8]>,
    len: usize,
}

impl Bucket {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            bits: vec![0; len.div_ceil(8)].into_boxed_slice(),
            len,
        }
    }

    pub(crate) fn get(&self, pos: usize) -> bool {
        debug_assert!(pos < self.len);
        let (byte_index, mask) = location(pos);
        (self.bits[byte_index] & mask) != 0
    }

    pub(crate) fn set(&mut self, pos: usize, value: bool) {
        debug_assert!(pos < self.len);
        let (byte_index, mask) = location(pos);
        if value {
            self.bits[byte_index] |= mask;
        } else {
            self.bits[byte_index] &= !mask;
        }
    }

    /// First position at or after `from` holding `true`.
    pub(crate) fn next_enabled(&self, from: usize) -> Option<usize> {
        let mut pos = from;
        while pos < self.len {
            let (byte_index, mask) = location(pos);
            let byte = self.bits[byte_index];
            if byte == 0 {
                pos = (byte_index + 1) * 8;
            } else if (byte & mask) != 0 {
                return Some(pos);
            } else {
                pos += 1;
            }
        }
        None
    }
}

fn location(pos: usize) -> (usize, u8) {
    (pos / 8, 1 << (pos % 8))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_all_false() {
        let bucket = Bucket::new(13);
        assert!((0..13).all(|pos| !bucket.get(pos)));
        assert_eq!(bucket.next_enabled(0), None);
    }

    #[test]
    fn set_and_clear() {
        let mut bucket = Bucket::new(20);
        bucket.set(3, true);
        bucket.set(8, true);
        bucket.set(19, true);
        assert!(bucket.get(3) && bucket.get(8) && bucket.get(19));
        assert!(!bucket.get(4));

        bucket.set(8, false);
        assert!(!bucket.get(8));
        // clearing twice leaves neighbours alone
        bucket.set(8, false);
        assert!(bucket.get(3) && bucket.get(19));
    }

    #[test]
    fn enabled_positions_are_ascending() {
        let mut bucket = Bucket::new(1000);
        for pos in [999, 0, 7, 8, 500] {
            bucket.set(pos, true);
        }
        let enabled: Vec<usize> =
            std::iter::successors(bucket.next_enabled(0), |&pos| bucket.next_enabled(pos + 1))
                .collect();
        assert_eq!(enabled, vec![0, 7, 8, 500, 999]);
        assert_eq!(bucket.next_enabled(9), Some(500));
        assert_eq!(bucket.next_enabled(1000), None);
    }
}
