//! End-to-end compilation tests: whole programs in, emitted machine code
//! and ELF images inspected as bytes.

use wavec::backend::elf;
use wavec::frontend::Compiler;

fn compile(src: &str) -> Compiler {
    let mut c = Compiler::new(src.as_bytes().to_vec());
    c.compile();
    c
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn mov_rax_imm(v: i64) -> Vec<u8> {
    let mut b = vec![0x48, 0xb8];
    b.extend_from_slice(&(v as u64).to_le_bytes());
    b
}

fn mov_rdi_imm(v: i64) -> Vec<u8> {
    let mut b = vec![0x48, 0xbf];
    b.extend_from_slice(&(v as u64).to_le_bytes());
    b
}

fn exit_imm(code: i64) -> Vec<u8> {
    let mut b = mov_rax_imm(60);
    b.extend_from_slice(&mov_rdi_imm(code));
    b.extend_from_slice(&[0x0f, 0x05]);
    b
}

/// `push rbp; mov rbp, rsp; sub rsp, n`.
fn prologue(scratch: i32) -> Vec<u8> {
    let mut b = vec![0x55, 0x48, 0x89, 0xe5, 0x48, 0x81, 0xec];
    b.extend_from_slice(&scratch.to_le_bytes());
    b
}

/// Offsets of every `jmp rel32` / `call rel32` whose resolved target is
/// `target`. Scans opportunistically; immediates can alias the opcode byte,
/// so callers assert existence rather than exact counts.
fn branch_sites(code: &[u8], opcode: u8, target: usize) -> Vec<usize> {
    let mut sites = Vec::new();
    for i in 0..code.len().saturating_sub(4) {
        if code[i] == opcode {
            let disp = i32::from_le_bytes(code[i + 1..i + 5].try_into().unwrap());
            if i as i64 + 5 + disp as i64 == target as i64 {
                sites.push(i);
            }
        }
    }
    sites
}

#[test]
fn test_compilation_is_deterministic() {
    let src = r#"
g = 1
fn twice n { -> n + n }
out "hello\n"
i = 0
loop { i = i + 1 when i >= 5 { break } }
syscall.exit(twice(i))
"#;
    let a = compile(src);
    let b = compile(src);
    assert_eq!(a.code(), b.code());
    assert_eq!(
        elf::build_image(a.code(), a.data(), a.global_bytes()),
        elf::build_image(b.code(), b.data(), b.global_bytes())
    );
}

#[test]
fn test_top_level_frame_reserves_512_bytes() {
    let c = compile("syscall.exit(0)\n");
    assert!(c.code().starts_with(&prologue(512)));
}

#[test]
fn test_out_inlines_string_and_writes_stdout() {
    let c = compile("out \"Hi\\n\" syscall.exit(0)");
    let code = c.code();

    // Near jump over the three inlined bytes, directly after the prologue.
    assert_eq!(&code[11..16], &[0xe9, 3, 0, 0, 0]);
    assert_eq!(&code[16..19], b"Hi\n");

    // write(1, rip-relative, 3): the lea displacement backs up over the two
    // 10-byte immediate moves, the lea itself, and the string.
    let mut write_seq = mov_rax_imm(1);
    write_seq.extend_from_slice(&mov_rdi_imm(1));
    write_seq.extend_from_slice(&[0x48, 0x8d, 0x35]);
    write_seq.extend_from_slice(&(-30i32).to_le_bytes());
    assert_eq!(find(code, &write_seq), Some(19));

    // Explicit exit, then the safety exit terminator: identical sequences.
    let exit = exit_imm(0);
    assert_eq!(code.len(), 102);
    assert_eq!(&code[58..80], exit.as_slice());
    assert_eq!(&code[80..102], exit.as_slice());
}

#[test]
fn test_globals_allocate_from_base_and_subtract_flat() {
    // The compiled program exits with status 2 via x - y on globals.
    let c = compile("x = 7 y = 5 syscall.exit(x - y)");
    assert_eq!(c.var_count(), 2);
    assert_eq!(c.global_bytes(), 16);

    // Global stores: push rax; movabs rbx, addr; pop rax; mov [rbx], rax.
    for addr in [0x600000u64, 0x600008] {
        let mut store = vec![0x50, 0x48, 0xbb];
        store.extend_from_slice(&addr.to_le_bytes());
        store.extend_from_slice(&[0x58, 0x48, 0x89, 0x03]);
        assert!(find(c.code(), &store).is_some(), "store to {:#x}", addr);
    }

    // x - y: load x, spill, load y, pop into rbx, subtract via rcx.
    let mut sub_tail = vec![0x5b]; // pop rbx
    sub_tail.extend_from_slice(&[0x48, 0x89, 0xc1, 0x48, 0x89, 0xd8, 0x48, 0x29, 0xc8]);
    // exit takes the expression path: mov rdi, rax; mov rax, 60; syscall.
    sub_tail.extend_from_slice(&[0x48, 0x89, 0xc7]);
    sub_tail.extend_from_slice(&mov_rax_imm(60));
    sub_tail.extend_from_slice(&[0x0f, 0x05]);
    assert!(find(c.code(), &sub_tail).is_some());
}

#[test]
fn test_function_call_frame_and_fixup() {
    // add(40, 2) exits with status 42.
    let c = compile("fn add a b { -> a + b } syscall.exit(add(40, 2))");
    let code = c.code();

    // Call site: both arguments pushed left-to-right, then the call and the
    // 16-byte argument pop.
    let mut call_site = mov_rax_imm(40);
    call_site.push(0x50);
    call_site.extend_from_slice(&mov_rax_imm(2));
    call_site.push(0x50);
    call_site.push(0xe8);
    let at = find(code, &call_site).unwrap();
    let fixup_pos = at + call_site.len();

    // The resolved displacement lands exactly on the function label.
    let target = c.label_offset("add").unwrap();
    let disp = i32::from_le_bytes(code[fixup_pos..fixup_pos + 4].try_into().unwrap());
    assert_eq!(target as i64, fixup_pos as i64 + 4 + disp as i64);

    // Argument pop after the call returns.
    assert_eq!(
        &code[fixup_pos + 4..fixup_pos + 11],
        &[0x48, 0x81, 0xc4, 0x10, 0, 0, 0]
    );

    // Function frame: prologue with 256 scratch bytes.
    let body = &code[target..];
    assert!(body.starts_with(&prologue(256)));

    // Two parameters: a at rbp+24, b at rbp+16.
    let mut add_body = vec![0x48, 0x8b, 0x85, 24, 0, 0, 0, 0x50];
    add_body.extend_from_slice(&[0x48, 0x8b, 0x85, 16, 0, 0, 0]);
    add_body.extend_from_slice(&[0x5b, 0x48, 0x01, 0xd8]);
    // `->` at function level: the real epilogue.
    add_body.extend_from_slice(&[0x48, 0x89, 0xec, 0x5d, 0xc3]);
    let body_at = find(body, &add_body).unwrap();

    // The function close after the body: release scratch, pop rbp, ret.
    let tail = body_at + add_body.len();
    assert_eq!(
        &body[tail..tail + 9],
        &[0x48, 0x81, 0xc4, 0x00, 1, 0, 0, 0x5d, 0xc3]
    );
}

#[test]
fn test_loop_back_edge_and_break_target() {
    // Counts to 5, then exits with status 5.
    let c = compile("i = 0 loop { i = i + 1 when i >= 5 { break } } syscall.exit(i)");
    let start = c.label_offset("_loop_start_0").unwrap();
    let end = c.label_offset("_loop_end_0").unwrap();
    let when_end = c.label_offset("_when_end_0").unwrap();
    assert!(start < end);

    // The break jumps forward to the loop end; the back edge jumps to the
    // start.
    assert!(!branch_sites(c.code(), 0xe9, end).is_empty());
    let back_edges = branch_sites(c.code(), 0xe9, start);
    assert!(back_edges.iter().any(|&p| p > start));

    // when's conditional jump: test rax, rax; je _when_end_0.
    let je_at = find(c.code(), &[0x48, 0x85, 0xc0, 0x0f, 0x84]).unwrap() + 5;
    let disp = i32::from_le_bytes(c.code()[je_at..je_at + 4].try_into().unwrap());
    assert_eq!(when_end as i64, je_at as i64 + 4 + disp as i64);

    // >= comparison lowers to cmp/setge/movzx.
    assert!(find(
        c.code(),
        &[0x48, 0x39, 0xc3, 0x0f, 0x9d, 0xc0, 0x48, 0x0f, 0xb6, 0xc0]
    )
    .is_some());
}

#[test]
fn test_functions_mutate_globals_in_place() {
    // bump() twice leaves 102 in the global.
    let c = compile("g = 100 fn bump { g = g + 1 } bump() bump() syscall.exit(g)");
    let target = c.label_offset("bump").unwrap();

    // Two separate call sites resolve to the function label.
    assert!(branch_sites(c.code(), 0xe8, target).len() >= 2);

    // Inside the function, g still resolves to its global slot.
    let mut store_g = vec![0x50, 0x48, 0xbb];
    store_g.extend_from_slice(&0x600000u64.to_le_bytes());
    store_g.extend_from_slice(&[0x58, 0x48, 0x89, 0x03]);
    assert!(find(&c.code()[target..], &store_g).is_some());
}

#[test]
fn test_unified_block_parses_fractions_and_clamps() {
    // The report quotes i=0.90 e=0.20 r=0.50.
    let c = compile("unified { i: 0.9, e: 0.2, r: 0.5 }\nsyscall.exit(0)\n");
    let uf = c.unified();
    assert_eq!(
        format!("i={:.2} e={:.2} r={:.2}", uf.i, uf.e, uf.r),
        "i=0.90 e=0.20 r=0.50"
    );

    // Setting the same values again leaves the record unchanged.
    let twice = compile(
        "unified { i: 0.9, e: 0.2, r: 0.5 }\nunified { i: 0.9, e: 0.2, r: 0.5 }\nsyscall.exit(0)\n",
    );
    assert_eq!(twice.unified(), c.unified());

    // Out-of-range values clamp at set time; long key names are accepted.
    let clamped = compile("unified { information_density: 2, e: -1, r: 0.5 }\nsyscall.exit(0)\n");
    let uf = clamped.unified();
    assert_eq!((uf.i, uf.e, uf.r), (1.0, 0.0, 0.5));
}

#[test]
fn test_keep_emits_pause_spin() {
    let c = compile("keep\n");
    assert!(find(c.code(), &[0xf3, 0x90, 0xeb, 0xfc]).is_some());
}

#[test]
fn test_undeclared_variable_reads_as_zero() {
    let c = compile("syscall.exit(zz)\n");
    let mut seq = mov_rax_imm(0);
    seq.extend_from_slice(&[0x48, 0x89, 0xc7]); // mov rdi, rax
    assert!(find(c.code(), &seq).is_some());
}

#[test]
fn test_unknown_statements_skip_the_line() {
    let plain = compile("syscall.exit(0)\n");
    let noisy = compile("blargh nonsense here\n@!%\nsyscall.exit(0)\n");
    assert_eq!(plain.code(), noisy.code());
}

#[test]
fn test_block_declarations_emit_nothing() {
    let plain = compile("syscall.exit(0)\n");
    for decl in [
        "gpu { x = 1 }\n",
        "pool fast { size: 4096 }\n",
        "task { out \"never\" }\n",
        "kernel { loop { } }\n",
        "use stdlib\n",
    ] {
        let src = format!("{}syscall.exit(0)\n", decl);
        let c = compile(&src);
        assert_eq!(plain.code(), c.code(), "declaration {:?} emitted code", decl);
    }
}

#[test]
fn test_fate_toggle_and_limit() {
    assert_eq!(compile("syscall.exit(0)\n").fate().mode(), "dynamic");
    assert_eq!(compile("fate off\nsyscall.exit(0)\n").fate().mode(), "static");
    let limited = compile("limit 8\nsyscall.exit(0)\n");
    assert_eq!(limited.fate().marginal_threshold, 0.125);
    // A compiled loop ticks the scheduler; flat gain collapses it.
    assert_eq!(compile("loop { break }\nsyscall.exit(0)\n").fate().mode(), "static");
}

#[test]
fn test_emit_inlines_raw_bytes() {
    let c = compile("emit \"\\x01\\x02\\xff\"\n");
    assert!(find(c.code(), &[0xe9, 3, 0, 0, 0, 0x01, 0x02, 0xff]).is_some());
}

#[test]
fn test_string_expression_is_rip_relative() {
    let c = compile("x = \"abc\"\nsyscall.exit(0)\n");
    // Short jump over "abc\0", then lea rax back over data + lea.
    let mut seq = vec![0xeb, 4, b'a', b'b', b'c', 0, 0x48, 0x8d, 0x05];
    seq.extend_from_slice(&(-11i32).to_le_bytes());
    assert!(find(c.code(), &seq).is_some());
}

#[test]
fn test_syscall_write_argument_shuffle() {
    let c = compile("syscall.write(1, \"x\", 1)\n");
    // pop rax; mov rsi, rax; pop rax; mov rdi, rax; mov rax, 1; syscall.
    let mut seq = vec![0x58, 0x48, 0x89, 0xc6, 0x58, 0x48, 0x89, 0xc7];
    seq.extend_from_slice(&mov_rax_imm(1));
    seq.extend_from_slice(&[0x0f, 0x05]);
    assert!(find(c.code(), &seq).is_some());
}

#[test]
fn test_syscall_mmap_register_shuffle() {
    let c = compile("syscall.mmap(0, 4096, 7, 34, 0, 0)\n");
    // mov r9, rax; pop r8; pop r10.
    assert!(find(c.code(), &[0x49, 0x89, 0xc1, 0x41, 0x58, 0x41, 0x5a]).is_some());
    let mut tail = mov_rax_imm(9);
    tail.extend_from_slice(&[0x0f, 0x05]);
    assert!(find(c.code(), &tail).is_some());
}

#[test]
fn test_putchar_and_getchar_red_zone() {
    let c = compile("putchar(65)\nx = getchar()\nsyscall.exit(0)\n");
    // putchar: sub rsp, 16; mov [rsp], al.
    assert!(find(c.code(), &[0x48, 0x81, 0xec, 16, 0, 0, 0, 0x88, 0x04, 0x24]).is_some());
    // getchar result: movzx rax, byte [rsp]; add rsp, 16.
    assert!(find(
        c.code(),
        &[0x48, 0x0f, 0xb6, 0x04, 0x24, 0x48, 0x81, 0xc4, 16, 0, 0, 0]
    )
    .is_some());
}

#[test]
fn test_peek_and_poke_byte_access() {
    let c = compile("poke(0x1000, 65)\nx = peek(0x1000)\nsyscall.exit(0)\n");
    assert!(find(c.code(), &[0x5b, 0x88, 0x03]).is_some()); // pop rbx; mov [rbx], al
    assert!(find(c.code(), &[0x48, 0x0f, 0xb6, 0x00]).is_some()); // movzx rax, byte [rax]
}

#[test]
fn test_elf_image_wraps_compiled_code() {
    let c = compile("g = 1\nsyscall.exit(0)\n");
    let image = elf::build_image(c.code(), c.data(), c.global_bytes());
    assert_eq!(&image[0..4], b"\x7fELF");
    let entry = u64::from_le_bytes(image[24..32].try_into().unwrap());
    assert_eq!(entry, 0x400000 + 120);
    assert_eq!(u16::from_le_bytes([image[56], image[57]]), 1);
    assert_eq!(&image[120..120 + c.code().len()], c.code());
}

#[test]
fn test_otherwise_block_is_unconditional() {
    // `otherwise { … }` at top level compiles its block with no branch.
    let c = compile("otherwise { x = 1 }\nsyscall.exit(0)\n");
    assert_eq!(c.var_count(), 1);
    assert!(find(c.code(), &[0x0f, 0x84]).is_none()); // no je emitted
}

#[test]
fn test_flat_precedence_groups_rightward() {
    // 2 * 3 + 4 under flat precedence is 2 * (3 + 4): the multiply must be
    // emitted after the add.
    let c = compile("x = 2 * 3 + 4\nsyscall.exit(0)\n");
    let add_at = find(c.code(), &[0x48, 0x01, 0xd8]).unwrap();
    let mul_at = find(c.code(), &[0x48, 0x0f, 0xaf, 0xc3]).unwrap();
    assert!(add_at < mul_at);
}

#[test]
fn test_division_sign_extends() {
    let c = compile("x = 10 / 3\nsyscall.exit(0)\n");
    // mov rbx, rax; pop rax; cqo; idiv rbx.
    assert!(find(
        c.code(),
        &[0x48, 0x89, 0xc3, 0x58, 0x48, 0x99, 0x48, 0xf7, 0xfb]
    )
    .is_some());
}
