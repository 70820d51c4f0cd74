/// rounds the given value `value` up to the nearest multiple
/// of `align`
#[inline(always)]
pub const fn align_usize(value: usize, align: usize) -> usize {
    if align == 0 {
        return value;
    }

    ((value + align - 1) / align) * align
}

#[inline(always)]
pub const fn is_aligned(addr: usize, align: usize) -> bool {
    addr & align.wrapping_sub(1) == 0
}

pub struct FormattedSize {
    pub size: usize,
}

impl std::fmt::Display for FormattedSize {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let ksize = (self.size as f64) / 1024f64;

        if ksize < 1f64 {
            return write!(f, "{}B", self.size);
        }

        let msize = ksize / 1024f64;

        if msize < 1f64 {
            return write!(f, "{:.1}K", ksize);
        }

        let gsize = msize / 1024f64;

        if gsize < 1f64 {
            write!(f, "{:.1}M", msize)
        } else {
            write!(f, "{:.1}G", gsize)
        }
    }
}

pub fn formatted_size(size: usize) -> FormattedSize {
    FormattedSize { size }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_rounds_up_to_multiple() {
        assert_eq!(align_usize(0, 16), 0);
        assert_eq!(align_usize(1, 16), 16);
        assert_eq!(align_usize(16, 16), 16);
        assert_eq!(align_usize(17, 16), 32);
        assert_eq!(align_usize(5, 0), 5);
        assert!(is_aligned(32, 16));
        assert!(!is_aligned(40, 16));
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(formatted_size(512).to_string(), "512B");
        assert_eq!(formatted_size(2048).to_string(), "2.0K");
        assert_eq!(formatted_size(3 * 1024 * 1024).to_string(), "3.0M");
        assert_eq!(formatted_size(2 * 1024 * 1024 * 1024).to_string(), "2.0G");
    }
}
