use std::collections::{HashMap, HashSet};
use num_traits::FromPrimitive;

use crate::common::{Mnemonic, Register};

macro_rules! insert {
    ($m:ident : $key:expr => $val:expr) => {
        assert!($m.insert($key, $val).is_none())
    };
    ($s:ident : $val:expr) => {
        assert!($s.insert($val))
    }
}

pub(super) const ADDRESS_DELIMITER: u8 = b':';
pub(super) const IMMEDIATE_PREFIX: char = '$';
pub(super) const INDIRECT_PREFIX: char = '*';

lazy_static! {
    pub(super) static ref MNEMONICS: HashMap<&'static str, Mnemonic> = {
        let mut m = HashMap::new();
        for mnemonic in (0..).map_while(Mnemonic::from_u8) {
            insert!(m: mnemonic.name() => mnemonic);
        }
        m
    };
    pub(super) static ref REGISTERS: HashMap<&'static str, Register> = {
        let mut m = HashMap::new();
        for reg in (0..).map_while(Register::from_u8) {
            insert!(m: reg.name() => reg);
        }
        m
    };
    /// Instruction prefixes that objdump prints between the byte column and the mnemonic.
    pub(super) static ref PREFIXES: HashSet<&'static str> = {
        let mut s = HashSet::new();

        insert!(s: "lock");
        insert!(s: "cs");
        insert!(s: "ds");
        insert!(s: "ss");
        insert!(s: "es");
        insert!(s: "fs");
        insert!(s: "gs");
        insert!(s: "data16");
        insert!(s: "addr32");
        insert!(s: "notrack");
        insert!(s: "bnd");
        insert!(s: "rep");
        insert!(s: "repz");
        insert!(s: "repnz");
        insert!(s: "repe");
        insert!(s: "repne");

        s
    };
}

#[test]
fn test_mnemonic_table_round_trip() {
    let all: Vec<Mnemonic> = (0..).map_while(Mnemonic::from_u8).collect();
    assert_eq!(all.len(), 25);
    for &m in all.iter() {
        assert_eq!(MNEMONICS.get(m.name()), Some(&m));
    }
    for (&name, &m) in MNEMONICS.iter() {
        assert_eq!(m.name(), name);
    }
    assert_eq!(MNEMONICS.len(), all.len());
}

#[test]
fn test_register_table_round_trip() {
    let all: Vec<Register> = (0..).map_while(Register::from_u8).collect();
    assert_eq!(all.len(), REGISTERS.len());
    for &r in all.iter() {
        assert_eq!(REGISTERS.get(r.name()), Some(&r));
    }
    assert_eq!(REGISTERS.get("rax"), None); // sigil is part of the name
    assert_eq!(REGISTERS.get("%RAX"), None); // listings are lowercase
}
