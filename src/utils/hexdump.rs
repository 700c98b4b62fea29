use std::fmt::Write;

/// Render up to `limit` bytes as a canonical hexdump (`hexdump -C` style), used in debug logs
/// when a record fails to decode.
///
/// `offset` is the absolute offset of `data[0]`, lines are labeled with absolute addresses.
pub(crate) fn hexdump(data: &[u8], offset: u64, limit: usize) -> String {
    let data = &data[..data.len().min(limit)];
    let mut out = String::with_capacity(data.len() * 4 + 16);

    for (line_no, line) in data.chunks(16).enumerate() {
        let _ = write!(out, "\n{:08x}:", offset + (line_no * 16) as u64);
        for b in line {
            let _ = write!(out, " {:02x}", b);
        }
        for _ in line.len()..16 {
            out.push_str("   ");
        }
        out.push_str("  |");
        for &c in line {
            // replace all control chars with dots
            if c.is_ascii_graphic() || c == b' ' {
                out.push(c as char);
            } else {
                out.push('.');
            }
        }
        out.push('|');
    }

    out
}
