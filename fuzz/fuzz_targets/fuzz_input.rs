// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use leafscan::report::content_disposition;
use leafscan::store::sanitize_filename;

#[derive(Arbitrary, Debug)]
struct Input<'a> {
    upload_name: &'a str,
    ascii_filename: &'a str,
    display_filename: &'a str,
}

fuzz_target!(|input: Input<'_>| {
    if let Ok(name) = sanitize_filename(input.upload_name) {
        assert!(!name.is_empty());
        assert!(!name.contains(['/', '\\', '\0']));
        assert!(name != "." && name != "..");
    }

    let header = content_disposition(input.ascii_filename, input.display_filename);
    assert!(header.is_ascii());
    assert!(!header.contains(['\r', '\n']));
});
