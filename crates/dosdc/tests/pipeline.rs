//! End-to-end tests: executable bytes through the whole pipeline.

use std::io::Write;

use dosdc::{
    CfgError, Error, GraphDump, Image, Listing, Liveness, Mnemonic, NodeKind, Pipeline,
    PipelineConfig, SegOff,
};

fn com(code: &[u8]) -> Image {
    Image::parse_com(code).unwrap()
}

fn at(off: u16) -> SegOff {
    SegOff::new(0, off)
}

/// Four-way bounds-checked dispatch at 0x100.
fn dispatch_com() -> Vec<u8> {
    let mut code = vec![0xCC; 0x63];
    let chunks: [(usize, &[u8]); 12] = [
        (0x100, &[0x3D, 0x03, 0x00]),             // cmp ax, 3
        (0x103, &[0x76, 0x03]),                   // jbe 0x108
        (0x105, &[0xE9, 0x58, 0x00]),             // jmp 0x160
        (0x108, &[0x01, 0xC0]),                   // add ax, ax
        (0x10A, &[0x93]),                         // xchg ax, bx
        (0x10B, &[0x2E, 0xFF, 0xA7, 0x10, 0x01]), // jmp cs:[bx+0x110]
        (0x110, &[0x20, 0x01, 0x30, 0x01, 0x40, 0x01, 0x50, 0x01]),
        (0x120, &[0xB8, 0x00, 0x00, 0xC3]),
        (0x130, &[0xB8, 0x01, 0x00, 0xC3]),
        (0x140, &[0xB8, 0x02, 0x00, 0xC3]),
        (0x150, &[0xB8, 0x03, 0x00, 0xC3]),
        (0x160, &[0x31, 0xC0, 0xC3]), // xor ax, ax ; ret
    ];
    for (off, bytes) in chunks {
        let start = off - 0x100;
        code[start..start + bytes.len()].copy_from_slice(bytes);
    }
    code
}

#[test]
fn test_discovers_mutually_recursive_functions() {
    let code = [
        0xE8, 0x03, 0x00, // 100: call 0x106
        0xC3, // 103: ret
        0x90, 0x90, // padding
        0xE8, 0x03, 0x00, // 106: call 0x10c
        0xC3, // 109: ret
        0x90, 0x90, // padding
        0xE8, 0xF7, 0xFF, // 10c: call 0x106
        0xC3, // 10f: ret
    ];
    let mut pipeline = Pipeline::new(com(&code), PipelineConfig::default());
    pipeline.run([at(0x100)]);

    let entries: Vec<u32> = pipeline.functions.keys().copied().collect();
    assert_eq!(entries, vec![0x100, 0x106, 0x10C]);
    assert!(pipeline.failures.is_empty());
    for function in pipeline.functions.values() {
        assert_eq!(function.graph.count(NodeKind::End), 1);
        assert_eq!(function.disassembly.len(), 2);
    }
    assert_eq!(pipeline.function(at(0x10C)).unwrap().disassembly.callees, vec![at(0x106)]);

    let mut single = Pipeline::new(com(&code), PipelineConfig::default().with_follow_calls(false));
    single.run([at(0x100)]);
    assert_eq!(single.functions.len(), 1);
}

#[test]
fn test_failing_function_does_not_abort_others() {
    let code = [
        0xE8, 0x04, 0x00, // 100: call 0x107
        0xE8, 0x02, 0x00, // 103: call 0x108
        0xC3, // 106: ret
        0xC3, // 107: ret
        0x0F, 0x0F, // 108: invalid
    ];
    let mut pipeline = Pipeline::new(com(&code), PipelineConfig::default());
    pipeline.run([at(0x100)]);

    let entries: Vec<u32> = pipeline.functions.keys().copied().collect();
    assert_eq!(entries, vec![0x100, 0x107]);
    assert_eq!(pipeline.failures.len(), 1);
    let failure = &pipeline.failures[0];
    assert_eq!(failure.entry, at(0x108));
    assert!(matches!(
        failure.error,
        Error::Cfg(CfgError::Decode { addr: 0x108, .. })
    ));
    let stats = pipeline.stats();
    assert_eq!((stats.functions, stats.failures), (2, 1));
}

#[test]
fn test_dispatch_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&dispatch_com()).unwrap();
    let image = Image::load(file.path()).unwrap();

    let mut pipeline = Pipeline::new(image, PipelineConfig::default());
    pipeline.run([pipeline.image.entry]);
    assert!(pipeline.failures.is_empty());

    let function = pipeline.function(at(0x100)).unwrap();
    let switch = function.graph.node_at(0x10B).unwrap();
    assert_eq!(switch.kind, NodeKind::Switch);
    assert_eq!(switch.cases, vec![0, 1, 2, 3]);
    for edge in &switch.edges {
        let case = function.graph.node(*edge);
        assert_eq!(case.kind, NodeKind::Block);
        assert_eq!(case.edges, vec![function.graph.end.unwrap()]);
    }
    assert_eq!(pipeline.stats().switches, 1);

    let listing = Listing(&function.disassembly).to_string();
    assert!(listing.contains("switch ax, 0: 0x0120, 1: 0x0130, 2: 0x0140, 3: 0x0150"));
    assert!(listing.contains("L00120:"));
    assert!(listing.contains("0000:0108  nop"));

    let live = Liveness::compute(&function.graph);
    let dump = GraphDump::new(&function.graph).with_liveness(&live).to_string();
    assert!(dump.contains("switch 0x0010b"));
    assert!(dump.contains("-> 0: n"));
    assert!(dump.contains("in: "));
}

#[test]
fn test_unrecognized_dispatch_is_reported_not_fatal() {
    // mov bx, 0x110 ; jmp bx
    let mut pipeline = Pipeline::new(com(&[0xBB, 0x10, 0x01, 0xFF, 0xE3]), PipelineConfig::default());
    pipeline.run([at(0x100)]);
    let function = pipeline.function(at(0x100)).unwrap();
    assert_eq!(function.graph.unresolved, vec![0x103]);
    assert_eq!(function.disassembly.find(0x103).unwrap().mnemonic, Mnemonic::Jmp);
    assert_eq!(pipeline.stats().unresolved, 1);
    assert!(
        Listing(&function.disassembly)
            .to_string()
            .contains("; unresolved dispatch")
    );
}

#[test]
fn test_exit_reached_through_jump() {
    // mov ax, 4c00 ; jmp 107 ; nop ; nop ; 107: int 21 ; <data>
    let code = [0xB8, 0x00, 0x4C, 0xEB, 0x02, 0x90, 0x90, 0xCD, 0x21, 0x0F, 0x0F];
    let mut pipeline = Pipeline::new(com(&code), PipelineConfig::default());
    pipeline.run([at(0x100)]);
    assert!(pipeline.failures.is_empty());
    let function = pipeline.function(at(0x100)).unwrap();
    assert!(function.disassembly.is_exit(0x107));
    assert_eq!(function.graph.count(NodeKind::End), 1);
}
