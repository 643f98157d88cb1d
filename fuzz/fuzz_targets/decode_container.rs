#![no_main]

use std::collections::HashMap;
use std::io::Cursor;

use libfuzzer_sys::fuzz_target;
use ocpkg::reader::{self, Candidates};

// Arbitrary bytes are never a valid OCpkg container; this only checks that
// the reader fails cleanly (FormatError/AuthError/PayloadLengthError/etc.)
// instead of panicking, on a fixed candidate key set.
fuzz_target!(|data: &[u8]| {
    let mut candidates = Candidates::new();
    candidates.symmetric.push(vec![0u8; 32]);
    candidates.symmetric.push(b"a shared passphrase".to_vec());

    let mut source = Cursor::new(data.to_vec());
    let _ = reader::peek_manifest(&mut source, &candidates);

    let mut source = Cursor::new(data.to_vec());
    let sinks: HashMap<uuid::Uuid, Box<dyn std::io::Write + Send>> = HashMap::new();
    let _ = reader::read(&mut source, &candidates, &HashMap::new(), sinks);
});
