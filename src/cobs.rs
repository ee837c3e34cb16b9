//! Consistent Overhead Byte Stuffing (COBS).
//!
//! Stuffing removes every zero from the payload, so a single `0x00` can
//! delimit frames on the serial link even though pixel data is full of zeros.
//!
//! Each run starts with a code byte `n`: `n - 1` literal bytes follow, then an
//! implicit zero, unless the run is a full `0xFF` run or ends the frame.

/// Frame delimiter on the wire
pub const DELIMITER: u8 = 0x00;

/// Code of a run that carries 254 literal bytes and no implicit zero
const MAX_CODE: u8 = 0xFF;

/// Worst-case encoded size of a `len` byte payload, delimiter included.
pub const fn max_encoded_len(len: usize) -> usize {
    len + len / 254 + 2
}

/// Decode one stuffed frame (without its delimiter) into `output`.
///
/// Returns the decoded length. Zero means there was nothing to decode or the
/// frame did not fit in `output`; either way no frame should be produced.
pub fn decode(input: &[u8], output: &mut [u8]) -> usize {
    let mut read = 0;
    let mut written = 0;

    while read < input.len() {
        let code = input[read];
        read += 1;

        if code == DELIMITER {
            break;
        }

        for _ in 1..code {
            if read >= input.len() {
                break;
            }
            let Some(slot) = output.get_mut(written) else {
                return 0;
            };
            *slot = input[read];
            read += 1;
            written += 1;
        }

        if code < MAX_CODE && read < input.len() {
            let Some(slot) = output.get_mut(written) else {
                return 0;
            };
            *slot = 0;
            written += 1;
        }
    }

    written
}

/// Encode `input` into `output`, appending the frame delimiter.
///
/// Returns the number of bytes written, or `None` if `output` is shorter
/// than [`max_encoded_len`] of the input.
pub fn encode(input: &[u8], output: &mut [u8]) -> Option<usize> {
    if output.len() < max_encoded_len(input.len()) {
        return None;
    }

    let mut code_index = 0;
    let mut written = 1;
    let mut code: u8 = 1;

    for &byte in input {
        if byte == 0 {
            output[code_index] = code;
            code_index = written;
            written += 1;
            code = 1;
            continue;
        }

        output[written] = byte;
        written += 1;
        code += 1;
        if code == MAX_CODE {
            output[code_index] = code;
            code_index = written;
            written += 1;
            code = 1;
        }
    }

    output[code_index] = code;
    output[written] = DELIMITER;
    Some(written + 1)
}
