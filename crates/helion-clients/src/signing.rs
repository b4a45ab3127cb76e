// Copyright (c) 2026 Helion Contributors
//
// Licensed under the MIT license. See LICENSE for details.
//
// The inverter vendor's request-signing contract is bit-exact and easy to get subtly
// wrong (§4.3, §9 "Signature format oddity"): the separator between the three signed
// fields is the four literal characters backslash-r-backslash-n, NOT an actual carriage
// return + line feed. Getting this wrong produces no error from the type system — only
// a silent "illegal signature" rejection from the device — so it is pinned down here as
// a named constant with a unit test against a known hash.

use md5::{Digest, Md5};

/// The literal (non-control-character) separator the signing contract requires.
pub const SIGNATURE_SEPARATOR: &str = "\\r\\n";

/// `MD5(path + SEP + token + SEP + timestamp_millis)`, lowercase hex.
pub fn compute_signature(path: &str, token: &str, timestamp_millis: i64) -> String {
    let message = format!("{path}{SIGNATURE_SEPARATOR}{token}{SIGNATURE_SEPARATOR}{timestamp_millis}");
    let digest = Md5::digest(message.as_bytes());
    hex_lower(&digest)
}

fn hex_lower(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
