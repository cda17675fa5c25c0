use std::io::Write;

use tcp_reach_rs::ports::{
    load_ports_from_path, parse_port_spec, well_known_ports, PortSet, DEFAULT_PORT_RANGE,
};
use tcp_reach_rs::ScanError;

#[test]
fn parse_examples() {
    let parse = |s: &str| parse_port_spec(Some(s), DEFAULT_PORT_RANGE).map(|p| p.to_vec());
    assert_eq!(parse("22,80,443").unwrap(), vec![22, 80, 443]);
    assert_eq!(parse("8000-8002").unwrap(), vec![8000, 8001, 8002]);
    assert_eq!(parse("22,8000-8002").unwrap(), vec![22, 8000, 8001, 8002]);
    assert_eq!(parse("0"), Err(ScanError::PortOutOfRange(0)));
    assert_eq!(parse("65536"), Err(ScanError::PortOutOfRange(65536)));
    assert_eq!(parse("100-50"), Err(ScanError::InvalidRange(100, 50)));
}

#[test]
fn parsing_canonical_form_is_idempotent() {
    // Small xorshift so the generated specs are reproducible.
    let mut state: u32 = 0x9E37_79B9;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        state
    };

    for _ in 0..200 {
        let tokens: Vec<String> = (0..(next() % 6 + 1))
            .map(|_| {
                let low = (next() % 65535 + 1) as u16;
                if next() % 2 == 0 {
                    low.to_string()
                } else {
                    let span = (next() % 40) as u16;
                    format!("{}-{}", low, low.saturating_add(span))
                }
            })
            .collect();
        let spec = tokens.join(" , ");

        let first: PortSet = spec.parse().expect("generated spec is valid");
        let canonical = first.to_string();
        let second: PortSet = canonical.parse().expect("canonical form parses");
        assert_eq!(first, second, "spec {spec:?} -> {canonical:?}");
        assert_eq!(second.to_string(), canonical);
    }
}

#[test]
fn well_known_ignores_textual_spec() {
    let preset = well_known_ports();
    assert!(!preset.is_empty());
    assert!(preset.contains(22) && preset.contains(443) && preset.contains(3389));
    let ascending = preset.to_vec();
    let mut sorted = ascending.clone();
    sorted.sort_unstable();
    assert_eq!(ascending, sorted);
}

#[test]
fn load_ports_file_from_disk() {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    writeln!(file, "# web").unwrap();
    writeln!(file, "80").unwrap();
    writeln!(file, "443  # tls").unwrap();
    writeln!(file).unwrap();
    writeln!(file, "8000-8002,80").unwrap();

    let ports = load_ports_from_path(file.path()).expect("parse ok");
    assert_eq!(ports.to_vec(), vec![80, 443, 8000, 8001, 8002]);
}

#[test]
fn missing_or_empty_ports_file_errors() {
    let missing = load_ports_from_path("/definitely/not/here/ports.txt");
    assert!(matches!(missing, Err(ScanError::PortsFile { .. })));

    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    writeln!(file, "# nothing selected").unwrap();
    assert_eq!(load_ports_from_path(file.path()), Err(ScanError::EmptyPortSet));
}
