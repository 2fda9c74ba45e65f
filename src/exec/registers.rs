//! Emulated hardware registers.

/// A 64-bit general-purpose CPU register with 32-bit and 8-bit views.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct CPURegister(pub u64);
impl CPURegister {
    /// Gets the full 64-bit value.
    pub const fn get_x64(self) -> u64 {
        self.0
    }
    /// Sets the full 64-bit value.
    pub fn set_x64(&mut self, val: u64) {
        self.0 = val;
    }

    /// Gets the low 32-bits.
    pub const fn get_x32(self) -> u32 {
        self.0 as u32
    }
    /// Sets the low 32-bits to `val` and zeros the high 32-bits.
    pub fn set_x32(&mut self, val: u32) {
        self.0 = val as u64;
    }

    /// Gets the low 8-bits.
    pub const fn get_x8(self) -> u8 {
        self.0 as u8
    }

    /// Gets the value with the given width (in bits), zero extended to 64-bit.
    /// Widths other than 32 read the full register.
    pub(super) fn get_width(self, width: u32) -> u64 {
        match width {
            32 => self.get_x32() as u64,
            _ => self.get_x64(),
        }
    }
    /// Writes the value with the given width (in bits), truncating it if too large.
    /// Widths other than 32 write the full register.
    pub(super) fn set_width(&mut self, width: u32, value: u64) {
        match width {
            32 => self.set_x32(value as u32),
            _ => self.set_x64(value),
        }
    }
}

#[test]
fn test_cpu_register() {
    let mut rax = CPURegister::default();
    assert_eq!(rax.get_width(64), 0);

    rax.set_width(64, 0xffff_ffff_8000_0001);
    assert_eq!(rax.get_width(64), 0xffff_ffff_8000_0001);
    assert_eq!(rax.get_width(32), 0x8000_0001);
    assert_eq!(rax.get_x8(), 0x01);

    // 32-bit writes zero the upper half
    rax.set_width(32, 0xdead_beef_cafe_babe);
    assert_eq!(rax.get_x64(), 0xcafe_babe);
    assert_eq!(rax.get_x32(), 0xcafe_babe);

    rax.set_x32(7);
    assert_eq!(rax.get_width(64), 7);
    rax.set_x64(u64::MAX);
    assert_eq!(rax.get_width(32), 0xffff_ffff);
}

macro_rules! impl_flag {
    ($mask_name:ident, $set:ident, $clear:ident, $flip:ident, $get:ident, $assign:ident => $from:ty [ $mask:literal ]) => {
        pub const $mask_name: $from = $mask;
        pub fn $set(&mut self) { self.0 |= $mask }
        pub fn $clear(&mut self) { self.0 &= !$mask }
        pub fn $flip(&mut self) { self.0 ^= $mask }
        pub const fn $get(self) -> bool { (self.0 & $mask) != 0 }
        pub fn $assign(&mut self, value: bool) {
            if value { self.$set() } else { self.$clear() }
        }
    }
}

/// The CPU flags register.
///
/// Only the flags written by `cmp` and `test` are modeled; their bit positions match RFLAGS.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Flags(pub u64);
impl Flags {
    impl_flag! { MASK_CF, set_cf, clear_cf, flip_cf, get_cf, assign_cf => u64 [0x0000000000000001] }
    impl_flag! { MASK_ZF, set_zf, clear_zf, flip_zf, get_zf, assign_zf => u64 [0x0000000000000040] }
    impl_flag! { MASK_SF, set_sf, clear_sf, flip_sf, get_sf, assign_sf => u64 [0x0000000000000080] }
    impl_flag! { MASK_OF, set_of, clear_of, flip_of, get_of, assign_of => u64 [0x0000000000000800] }

    /// Checks the "equal" condition.
    pub const fn condition_e(self) -> bool { self.get_zf() }
    /// Checks the "not equal" condition.
    pub const fn condition_ne(self) -> bool { !self.condition_e() }
    /// Checks the "below" condition.
    pub const fn condition_b(self) -> bool { self.get_cf() }
    /// Checks the "less than" condition.
    pub const fn condition_l(self) -> bool { self.get_sf() != self.get_of() }
}

#[test]
fn test_flags() {
    let mut f = Flags::default();
    assert!(!f.get_cf() && !f.get_zf() && !f.get_sf() && !f.get_of());

    f.set_zf();
    assert_eq!(f.0, Flags::MASK_ZF);
    assert!(f.condition_e());
    assert!(!f.condition_ne());

    f.assign_cf(true);
    f.assign_of(true);
    assert_eq!(f.0, mask!(Flags: MASK_ZF | MASK_CF | MASK_OF));
    assert!(f.condition_b());
    assert!(f.condition_l());

    f.flip_sf();
    assert!(!f.condition_l());
    f.clear_zf();
    f.assign_cf(false);
    assert_eq!(f.0, mask!(Flags: MASK_SF | MASK_OF));
    f.flip_of();
    f.flip_sf();
    assert_eq!(f.0, mask!());
}
