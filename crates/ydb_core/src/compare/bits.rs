//! Bit fields packed into record bytes.
//!
//! A field is `len` bits starting `ofs` bits into `ptr[0]`, spilling into
//! `ptr[1]` when `ofs + len > 8`. Valid shapes have `ofs < 8` and
//! `ofs + len <= 16`.

fn mask(len: u32) -> u32 {
    (1u32 << len) - 1
}

/// Reads a bit field.
///
/// # Panics
///
/// Panics if `ptr` is shorter than the bytes the field covers.
#[must_use]
pub fn get_rec_bits(ptr: &[u8], ofs: u32, len: u32) -> u16 {
    debug_assert!(ofs < 8 && ofs + len <= 16);
    let mut val = u32::from(ptr[0]);
    if ofs + len > 8 {
        val |= u32::from(ptr[1]) << 8;
    }
    ((val >> ofs) & mask(len)) as u16
}

/// Writes the low `len` bits of `bits` into a bit field.
///
/// Bits outside the field are left alone.
///
/// # Panics
///
/// Panics if `ptr` is shorter than the bytes the field covers.
pub fn set_rec_bits(bits: u16, ptr: &mut [u8], ofs: u32, len: u32) {
    debug_assert!(ofs < 8 && ofs + len <= 16);
    let bits = u32::from(bits) & mask(len);
    let field = mask(len) << ofs;
    ptr[0] = ((u32::from(ptr[0]) & !field) | (bits << ofs)) as u8;
    if ofs + len > 8 {
        let high = mask(len + ofs - 8);
        ptr[1] = ((u32::from(ptr[1]) & !high) | (bits >> (8 - ofs))) as u8;
    }
}

/// Zeroes a bit field.
pub fn clr_rec_bits(ptr: &mut [u8], ofs: u32, len: u32) {
    set_rec_bits(0, ptr, ofs, len);
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn field_inside_one_byte() {
        let mut buf = [0u8; 2];
        set_rec_bits(0b101, &mut buf, 2, 3);
        assert_eq!(buf, [0b1_0100, 0]);
        assert_eq!(get_rec_bits(&buf, 2, 3), 0b101);
    }

    #[test]
    fn field_straddling_bytes() {
        let mut buf = [0u8; 2];
        set_rec_bits(0x1FF, &mut buf, 7, 9);
        assert_eq!(buf, [0x80, 0xFF]);
        assert_eq!(get_rec_bits(&buf, 7, 9), 0x1FF);
    }

    #[test]
    fn clear_keeps_neighbours() {
        let mut buf = [0xFF, 0xFF];
        clr_rec_bits(&mut buf, 6, 4);
        assert_eq!(buf, [0x3F, 0xFC]);
    }

    #[test]
    fn one_byte_buffer_is_enough_for_narrow_fields() {
        let mut buf = [0u8; 1];
        set_rec_bits(1, &mut buf, 7, 1);
        assert_eq!(get_rec_bits(&buf, 7, 1), 1);
    }

    proptest! {
        #[test]
        fn set_then_get_returns_masked_bits(
            len in 1u32..=9,
            ofs in 0u32..8,
            bits in any::<u16>(),
            fill in any::<[u8; 2]>(),
        ) {
            let mut buf = fill;
            set_rec_bits(bits, &mut buf, ofs, len);
            prop_assert_eq!(get_rec_bits(&buf, ofs, len), bits & ((1u16 << len) - 1));

            let window = u32::from(fill[0]) | (u32::from(fill[1]) << 8);
            let after = u32::from(buf[0]) | (u32::from(buf[1]) << 8);
            let field = ((1u32 << len) - 1) << ofs;
            prop_assert_eq!(window & !field, after & !field);
        }
    }
}
