/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Helpers for compact log output.
//!
//! The consensus core logs through the [log](https://docs.rs/log/latest/log/) crate. To get
//! these messages printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};

// Get a more readable representation of a bytesequence by base64-encoding it and taking the
// first 7 characters.
pub(crate) fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}
