use super::*;

use std::io::{self, BufReader, Read};

struct FailingReader;
impl Read for FailingReader {
    fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::Other, "disk on fire"))
    }
}

#[test]
fn test_function_names() {
    let names = extract_function_names(LISTING.as_bytes()).unwrap();
    assert_eq!(names, vec!["_init", "frame_dummy", "add_five", "main"]);

    assert_eq!(extract_function_names("".as_bytes()).unwrap(), Vec::<String>::new());
    assert!(matches!(extract_function_names(BufReader::new(FailingReader)), Err(ListingError::Io(_))));
}

#[test]
fn test_function_block() {
    let block = extract_function_block(LISTING.as_bytes(), "add_five").unwrap();
    let lines: Vec<&str> = block.lines().collect();
    assert_eq!(lines.len(), 8);
    assert_eq!(lines[0], "0000000000001129 <add_five>:");
    assert_eq!(lines[7].trim(), "1139:\tc3                   \tret");

    // the last function ends at end of input
    let block = extract_function_block(LISTING.as_bytes(), "main").unwrap();
    assert_eq!(block.lines().count(), 13);

    let block = extract_function_block("0000000000001129 <f>:\n    1129:\tc3\tret".as_bytes(), "f").unwrap();
    assert_eq!(block, "0000000000001129 <f>:\n    1129:\tc3\tret");

    match extract_function_block(LISTING.as_bytes(), "puts") {
        Err(ListingError::FunctionNotFound(name)) => assert_eq!(name, "puts"),
        x => panic!("{:?}", x),
    }
    // names must match exactly
    assert!(matches!(extract_function_block(LISTING.as_bytes(), "add"), Err(ListingError::FunctionNotFound(_))));
    assert!(matches!(extract_function_block(BufReader::new(FailingReader), "main"), Err(ListingError::Io(_))));
}

#[test]
fn test_extract_function() {
    let f = extract_function(LISTING.as_bytes(), "frame_dummy").unwrap();
    assert_eq!(f.name, "frame_dummy");
    let mnemonics: Vec<Mnemonic> = f.instructions.iter().map(|i| i.mnemonic).collect();
    assert_eq!(mnemonics, vec![Mnemonic::ENDBR64, Mnemonic::JMP, Mnemonic::NOPL, Mnemonic::NOPW, Mnemonic::PADDING, Mnemonic::NOPW]);
    assert_eq!(f.instructions[1].operands, Some(vec![Operand::Address(0x1080)]));
    assert_eq!(f.instructions[2].operands, Some(vec![mem(Register::RAX, 0)]));
    assert_eq!(f.instructions[4].bytes, vec![0, 0, 0]);

    let f = extract_function(LISTING.as_bytes(), "_init").unwrap();
    assert_eq!(f.instructions.len(), 8);
    assert_eq!(f.instructions[5].operands, Some(vec![Operand::Register(Register::RAX)]));

    // addresses advance by instruction length
    let f = extract_function(LISTING.as_bytes(), "main").unwrap();
    for pair in f.instructions.windows(2) {
        assert_eq!(pair[0].address + pair[0].len(), pair[1].address);
    }
    assert_eq!(f.instructions[0].address, 0x113a);
    assert_eq!(f.instructions.last().unwrap().address, 0x1160);
}

#[test]
fn test_extract_function_errors() {
    let listing = "
0000000000001129 <square>:
    1129:\tf3 0f 1e fa          \tendbr64
    112d:\t55                   \tpush   %rbp
    112e:\t48 89 e5             \tmov    %rsp,%rbp
    1131:\t89 7d fc             \tmov    %edi,-0x4(%rbp)
    1134:\t8b 45 fc             \tmov    -0x4(%rbp),%eax
    1137:\t0f af c0             \timul   %eax,%eax
    113a:\t5d                   \tpop    %rbp
    113b:\tc3                   \tret
";
    match extract_function(listing.as_bytes(), "square") {
        Err(ListingError::Decode(DecodeError::BadLine { line_num: 7, inner })) => assert_eq!(*inner, DecodeError::UnknownMnemonic("imul".into())),
        x => panic!("{:?}", x),
    }
    assert!(matches!(extract_function(listing.as_bytes(), "main"), Err(ListingError::FunctionNotFound(_))));

    let e = extract_function(listing.as_bytes(), "square").unwrap_err();
    assert_eq!(format!("{}", e), "failed to decode function: line 7: unknown mnemonic 'imul'");
}

#[test]
fn test_link() {
    let p = extract_link_unwrap!(LISTING => "_init", "frame_dummy", "add_five", "main");
    assert_eq!(p.len(), 8 + 6 + 7 + 12);
    assert_eq!(p.symbol("main"), Some(0x113a));
    assert_eq!(p.symbol("add_five"), Some(0x1129));
    assert_eq!(p.symbol("puts"), None);
    assert_eq!(p.get(0x1149).map(|i| i.mnemonic), Some(Mnemonic::CALL));
    assert!(p.get(0x114a).is_none());

    let addresses: Vec<u64> = p.iter().map(|i| i.address).collect();
    let mut sorted = addresses.clone();
    sorted.sort_unstable();
    assert_eq!(addresses, sorted);
}

#[test]
fn test_link_errors() {
    assert!(matches!(link(vec![]), Err(LinkError::NothingToLink)));

    match extract_link!(LISTING => "main", "main") {
        Err(LinkError::DuplicateSymbol(name)) => assert_eq!(name, "main"),
        x => panic!("{:?}", x),
    }

    let mut alias = extract_function(LISTING.as_bytes(), "main").unwrap();
    alias.name = "alias".into();
    let main = extract_function(LISTING.as_bytes(), "main").unwrap();
    assert_eq!(link(vec![main, alias]).unwrap_err(), LinkError::DuplicateAddress(0x113a));
    assert_eq!(format!("{}", LinkError::DuplicateAddress(0x113a)), "multiple instructions at address 0x113a");

    // empty functions link but define no symbol
    let p = link(vec![Function { name: "empty".into(), instructions: vec![] }]).unwrap();
    assert!(p.is_empty());
    assert_eq!(p.symbol("empty"), None);
}
