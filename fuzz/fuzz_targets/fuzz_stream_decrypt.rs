//! Fuzz target for chunk stream decryption
//!
//! Random stream headers and chunk bytes under a fixed key. Forging a chunk
//! is infeasible, so inputs end in an error; the target checks that failures
//! never leave plaintext behind and that the state machine stays consistent.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use wirebackup_core::Key;
use wirebackup_core::stream::{ChunkReader, DecryptorState, ReadOutcome, StreamDecryptor};

const FIXED_KEY: [u8; 32] = [
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f,
    0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1a, 0x1b, 0x1c, 0x1d, 0x1e, 0x1f,
];

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    /// Bytes offered as the stream header (may be short)
    stream_header: Vec<u8>,
    /// Plaintext capacity per chunk
    chunk_size: u8,
    /// Everything after the stream header
    body: Vec<u8>,
}

fuzz_target!(|input: FuzzInput| {
    let chunk_size = usize::from(input.chunk_size).max(1);
    let mut decryptor = StreamDecryptor::new();
    if decryptor
        .init_pull(Key::new(FIXED_KEY, [0u8; 16]), &input.stream_header)
        .is_err()
    {
        assert_eq!(decryptor.state(), DecryptorState::Failed);
        return;
    }

    let mut reader = ChunkReader::new(&input.body[..], chunk_size);
    let mut plaintext = vec![0u8; chunk_size];
    loop {
        let ciphertext = match reader.read_chunk() {
            Ok(ReadOutcome::Chunk(ciphertext)) => ciphertext,
            Ok(ReadOutcome::EndOfInput) => break,
            Err(e) => panic!("reading from a slice failed: {e}"),
        };
        plaintext.fill(0);
        match decryptor.pull_chunk(ciphertext, &mut plaintext) {
            Ok(_) if decryptor.state() == DecryptorState::Finished => return,
            Ok(_) => {}
            Err(_) => {
                assert!(plaintext.iter().all(|&b| b == 0), "plaintext leaked on failure");
                assert_eq!(decryptor.state(), DecryptorState::Failed);
                return;
            }
        }
    }
    assert!(decryptor.finish().is_err());
});
