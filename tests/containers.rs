//! End-to-end container decode/encode tests exercising the full stack:
//! definitions, resolution, calibration, and raw encodings together.

use std::collections::HashMap;

use tmtc::{
    resolve, BitBuffer, Calibrator, Comparison, CompareOp, ContainerDef, DataSource,
    DefinitionTree, EntryDef, EntryRef, EnumTable, ParameterDef, PolyTerm, RawEncoding, Repeat,
    StreamDispatcher, TypeDef, Value,
};

fn param(
    tree: &mut DefinitionTree,
    name: &str,
    ty: usize,
) -> usize {
    tree.add_parameter(ParameterDef::builder().name(name).type_idx(ty).build())
}

/// Five packed fields of 32, 32, 32, 64, and 8 bits, 184 bits total,
/// decode and re-encode to the identical bit sequence.
#[test]
fn packed_container_round_trips_bit_exact() {
    let mut tree = DefinitionTree::default();
    let u32t = tree.add_type(
        TypeDef::builder()
            .name("u32")
            .encoding(RawEncoding::Unsigned { bits: 32 })
            .build(),
    );
    let i32t = tree.add_type(
        TypeDef::builder()
            .name("i32")
            .encoding(RawEncoding::TwosComplement { bits: 32 })
            .build(),
    );
    let f32t = tree.add_type(
        TypeDef::builder()
            .name("f32")
            .encoding(RawEncoding::Ieee754 { bits: 32 })
            .build(),
    );
    let f64t = tree.add_type(
        TypeDef::builder()
            .name("f64")
            .encoding(RawEncoding::Ieee754 { bits: 64 })
            .build(),
    );
    let u8t = tree.add_type(
        TypeDef::builder()
            .name("u8")
            .encoding(RawEncoding::Unsigned { bits: 8 })
            .build(),
    );
    let entries = vec![
        param(&mut tree, "Seq", u32t),
        param(&mut tree, "Delta", i32t),
        param(&mut tree, "Ratio", f32t),
        param(&mut tree, "Time", f64t),
        param(&mut tree, "Flags", u8t),
    ]
    .into_iter()
    .map(|p| EntryDef::builder().what(EntryRef::Parameter(p)).build())
    .collect();
    let hk = tree.add_container(ContainerDef::builder().name("Hk").entries(entries).build());

    let mut dat = Vec::new();
    dat.extend_from_slice(&0x0102_0304u32.to_be_bytes());
    dat.extend_from_slice(&(-5i32).to_be_bytes());
    dat.extend_from_slice(&1.5f32.to_be_bytes());
    dat.extend_from_slice(&2.25f64.to_be_bytes());
    dat.push(0xa5);
    assert_eq!(dat.len() * 8, 184);

    let buf = BitBuffer::from_bytes(&dat);
    let model = resolve(&tree, hk, DataSource::Bits(&buf)).unwrap();

    assert!(model.is_valid(), "warnings: {:?}", model.warnings());
    assert_eq!(model.total_size_bits(), 184);
    assert_eq!(
        model.entry("Delta").unwrap().value.as_ref().unwrap().uncalibrated,
        Value::Signed(-5)
    );
    assert_eq!(
        model.entry("Ratio").unwrap().value.as_ref().unwrap().uncalibrated,
        Value::Double(1.5)
    );
    assert_eq!(model.encode_to_bits(), buf);
}

/// Parent container restricts an inherited enumerated field to one label;
/// the child interpretation matches only when the data carries it.
#[test]
fn inherited_restriction_selects_interpretation() {
    let mut tree = DefinitionTree::default();
    let kind_t = tree.add_type(
        TypeDef::builder()
            .name("report_kind")
            .encoding(RawEncoding::Unsigned { bits: 16 })
            .calibrator(Calibrator::Enumeration {
                table: EnumTable::new([("PERIODIC", 0), ("DIAG", 7)]),
            })
            .build(),
    );
    let u64t = tree.add_type(
        TypeDef::builder()
            .name("u64")
            .encoding(RawEncoding::Unsigned { bits: 64 })
            .build(),
    );
    let kind = param(&mut tree, "Kind", kind_t);
    let a = param(&mut tree, "A", u64t);
    let b = param(&mut tree, "B", u64t);
    let base = tree.add_container(
        ContainerDef::builder()
            .name("Report")
            .is_abstract(true)
            .entries(vec![
                EntryDef::builder().what(EntryRef::Parameter(kind)).build(),
                EntryDef::builder().what(EntryRef::Parameter(a)).build(),
            ])
            .build(),
    );
    let diag = tree.add_container(
        ContainerDef::builder()
            .name("DiagReport")
            .base(base)
            .restrictions(vec![Comparison::new("Kind", CompareOp::Eq, "DIAG")])
            .entries(vec![EntryDef::builder().what(EntryRef::Parameter(b)).build()])
            .build(),
    );

    // 16 + 64 + 64 = 144 bits
    let mut dat = vec![0x00, 0x07];
    dat.extend_from_slice(&1u64.to_be_bytes());
    dat.extend_from_slice(&2u64.to_be_bytes());
    let buf = BitBuffer::from_bytes(&dat);

    let model = resolve(&tree, diag, DataSource::Bits(&buf)).unwrap();
    assert_eq!(model.total_size_bits(), 144);
    assert!(model.matches_restrictions());
    assert!(model.is_valid());
    assert!(model.warnings().is_empty());

    // same layout but Kind = PERIODIC: decodes, flagged non-matching
    let mut wrong = dat.clone();
    wrong[1] = 0x00;
    let buf = BitBuffer::from_bytes(&wrong);
    let model = resolve(&tree, diag, DataSource::Bits(&buf)).unwrap();
    assert!(!model.matches_restrictions());
    assert!(!model.is_valid());
    assert_eq!(model.warnings().len(), 1);
    assert!(
        model.warnings()[0].contains("restriction"),
        "{}",
        model.warnings()[0]
    );
    assert!(!model.is_compatible_with(&tree, &buf));
}

/// NEGNUM = -2 under two's- and one's-complement 16-bit encodings.
#[test]
fn enumerated_negative_label_encodes_per_raw_encoding() {
    for (encoding, expect) in [
        (RawEncoding::TwosComplement { bits: 16 }, "fffe"),
        (RawEncoding::OnesComplement { bits: 16 }, "fffd"),
    ] {
        let mut tree = DefinitionTree::default();
        let ty = tree.add_type(
            TypeDef::builder()
                .name("numbers")
                .encoding(encoding)
                .calibrator(Calibrator::Enumeration {
                    table: EnumTable::new([("TEST", 1), ("NEGNUM", -2)]),
                })
                .build(),
        );
        let p = param(&mut tree, "Num", ty);
        let cmd = tree.add_container(
            ContainerDef::builder()
                .name("Cmd")
                .entries(vec![EntryDef::builder().what(EntryRef::Parameter(p)).build()])
                .build(),
        );

        let mut values = HashMap::new();
        values.insert("Num".to_string(), Value::Text("NEGNUM".into()));
        let model = resolve(&tree, cmd, DataSource::Values(&values)).unwrap();
        assert!(model.is_valid(), "warnings: {:?}", model.warnings());
        assert_eq!(model.encode_to_bits().to_hex(), expect);

        // and back
        let bits = model.encode_to_bits();
        let decoded = resolve(&tree, cmd, DataSource::Bits(&bits)).unwrap();
        let num = decoded.entry("Num").unwrap().value.as_ref().unwrap();
        assert_eq!(num.uncalibrated, Value::Signed(-2));
        assert_eq!(num.calibrated, Value::Text("NEGNUM".into()));
    }
}

/// Degree-2 polynomial with terms 3 + 2x + x^2: calibrated 2 has the
/// single valid root -1 (raw 0xbf800000 as IEEE-754); calibrated -1 has
/// no real roots and must warn.
#[test]
fn quadratic_inversion_in_a_telecommand() {
    let mut tree = DefinitionTree::default();
    let ty = tree.add_type(
        TypeDef::builder()
            .name("quad")
            .encoding(RawEncoding::Ieee754 { bits: 32 })
            .calibrator(Calibrator::Polynomial {
                terms: vec![
                    PolyTerm::new(3.0, 0),
                    PolyTerm::new(2.0, 1),
                    PolyTerm::new(1.0, 2),
                ],
            })
            .build(),
    );
    let p = param(&mut tree, "Level", ty);
    let cmd = tree.add_container(
        ContainerDef::builder()
            .name("SetLevel")
            .entries(vec![EntryDef::builder().what(EntryRef::Parameter(p)).build()])
            .build(),
    );

    let mut values = HashMap::new();
    values.insert("Level".to_string(), Value::Double(2.0));
    let model = resolve(&tree, cmd, DataSource::Values(&values)).unwrap();
    assert!(model.is_valid(), "warnings: {:?}", model.warnings());
    assert_eq!(model.encode_to_bits().to_hex(), "bf800000");

    values.insert("Level".to_string(), Value::Double(-1.0));
    let model = resolve(&tree, cmd, DataSource::Values(&values)).unwrap();
    assert!(!model.warnings().is_empty());
    assert!(
        model.warnings()[0].contains("no real roots"),
        "{}",
        model.warnings()[0]
    );
}

/// Fixed-count repeat of five 32-bit entries after a 48-bit header:
/// offsets 48, 80, 112, 144, 176 and tags 1/5 through 5/5 in a 208-bit
/// container.
#[test]
fn fixed_repeat_group_offsets_and_tags() {
    let mut tree = DefinitionTree::default();
    let u48t = tree.add_type(
        TypeDef::builder()
            .name("u48")
            .encoding(RawEncoding::Unsigned { bits: 48 })
            .build(),
    );
    let u32t = tree.add_type(
        TypeDef::builder()
            .name("u32")
            .encoding(RawEncoding::Unsigned { bits: 32 })
            .build(),
    );
    let hdr = param(&mut tree, "Header", u48t);
    let reading = param(&mut tree, "Reading", u32t);
    let c = tree.add_container(
        ContainerDef::builder()
            .name("Readings")
            .entries(vec![
                EntryDef::builder().what(EntryRef::Parameter(hdr)).build(),
                EntryDef::builder()
                    .what(EntryRef::Parameter(reading))
                    .repeat(Repeat::Count(5))
                    .build(),
            ])
            .build(),
    );

    let buf = BitBuffer::zeroed(208);
    let model = resolve(&tree, c, DataSource::Bits(&buf)).unwrap();
    assert_eq!(model.total_size_bits(), 208);

    let readings: Vec<_> = model
        .entries()
        .iter()
        .filter(|e| e.name == "Reading")
        .collect();
    assert_eq!(readings.len(), 5);
    for (i, entry) in readings.iter().enumerate() {
        assert_eq!(entry.position, Some(48 + i * 32));
        let tag = entry.repeat.unwrap();
        assert_eq!(format!("{tag}"), format!("{}/5", i + 1));
    }
}

/// Dispatch then re-encode: the dispatcher picks the matching sibling and
/// its model reproduces the input bits.
#[test]
fn dispatch_and_round_trip() {
    let mut tree = DefinitionTree::default();
    let u8t = tree.add_type(
        TypeDef::builder()
            .name("u8")
            .encoding(RawEncoding::Unsigned { bits: 8 })
            .build(),
    );
    let u16t = tree.add_type(
        TypeDef::builder()
            .name("u16")
            .encoding(RawEncoding::Unsigned { bits: 16 })
            .build(),
    );
    let id = param(&mut tree, "Id", u8t);
    let temp = param(&mut tree, "Temp", u16t);
    let volt = param(&mut tree, "Volt", u16t);
    let root = tree.add_container(
        ContainerDef::builder()
            .name("Pkt")
            .is_abstract(true)
            .entries(vec![EntryDef::builder().what(EntryRef::Parameter(id)).build()])
            .build(),
    );
    tree.add_container(
        ContainerDef::builder()
            .name("TempPkt")
            .base(root)
            .restrictions(vec![Comparison::new("Id", CompareOp::Eq, 0x10u64)])
            .entries(vec![EntryDef::builder().what(EntryRef::Parameter(temp)).build()])
            .build(),
    );
    tree.add_container(
        ContainerDef::builder()
            .name("VoltPkt")
            .base(root)
            .restrictions(vec![Comparison::new("Id", CompareOp::Eq, 0x20u64)])
            .entries(vec![EntryDef::builder().what(EntryRef::Parameter(volt)).build()])
            .build(),
    );

    let dispatcher = StreamDispatcher::new(&tree, root);
    let buf = BitBuffer::from_bytes(&hex::decode("200bb8").unwrap());
    let model = dispatcher.dispatch(&buf).unwrap().unwrap();
    assert_eq!(model.container(), tree.lookup_container("VoltPkt").unwrap());
    assert_eq!(
        model.entry("Volt").unwrap().value.as_ref().unwrap().uncalibrated,
        Value::Unsigned(3000)
    );
    assert_eq!(model.encode_to_bits(), buf);
}

/// Encoding a telecommand whose restriction fixes an inherited argument
/// fills that argument without an explicit assignment.
#[test]
fn restriction_value_defaults_on_encode() {
    let mut tree = DefinitionTree::default();
    let u8t = tree.add_type(
        TypeDef::builder()
            .name("u8")
            .encoding(RawEncoding::Unsigned { bits: 8 })
            .build(),
    );
    let op = param(&mut tree, "Op", u8t);
    let arg = param(&mut tree, "Arg", u8t);
    let base = tree.add_container(
        ContainerDef::builder()
            .name("BaseCmd")
            .is_abstract(true)
            .kind(tmtc::ContainerKind::Telecommand)
            .entries(vec![EntryDef::builder().what(EntryRef::Argument(op)).build()])
            .build(),
    );
    let reset = tree.add_container(
        ContainerDef::builder()
            .name("ResetCmd")
            .base(base)
            .kind(tmtc::ContainerKind::Telecommand)
            .restrictions(vec![Comparison::new("Op", CompareOp::Eq, 0x42u64)])
            .entries(vec![EntryDef::builder().what(EntryRef::Argument(arg)).build()])
            .build(),
    );

    let mut values = HashMap::new();
    values.insert("Arg".to_string(), Value::Unsigned(7));
    let model = resolve(&tree, reset, DataSource::Values(&values)).unwrap();
    assert!(model.is_valid(), "warnings: {:?}", model.warnings());
    assert!(model.matches_restrictions());
    assert_eq!(model.encode_to_bits().to_hex(), "4207");
}
