//! Visual fingerprint ("drunken bishop") for out-of-band peer
//! confirmation (spec.md §1 lists this as an external collaborator;
//! no published crate implements it, so it's grown in-house here,
//! following OpenSSH's `key_fingerprint_randomart` algorithm that the
//! Go original's `drunken-bishop` dependency itself implements).

const WIDTH: usize = 17;
const HEIGHT: usize = 9;
const FIELD_CHARS: &[u8] = b" .o+=*BOX@%&#/^SE";
const START: u8 = (FIELD_CHARS.len() - 2) as u8;
const END: u8 = (FIELD_CHARS.len() - 1) as u8;

/// Renders the drunken-bishop random art for `digest`, one pair of bits
/// per step walking a 17x9 toroidal-bounded field.
pub fn render(digest: &[u8]) -> String {
    let mut field = [[0u8; WIDTH]; HEIGHT];
    let mut x = (WIDTH / 2) as isize;
    let mut y = (HEIGHT / 2) as isize;
    field[y as usize][x as usize] = START;

    for &byte in digest {
        let mut b = byte;
        for _ in 0..4 {
            let right = b & 0x1 != 0;
            let down = b & 0x2 != 0;
            x += if right { 1 } else { -1 };
            y += if down { 1 } else { -1 };
            x = x.clamp(0, (WIDTH - 1) as isize);
            y = y.clamp(0, (HEIGHT - 1) as isize);
            let cell = &mut field[y as usize][x as usize];
            if *cell < END - 1 {
                *cell += 1;
            }
            b >>= 2;
        }
    }

    field[y as usize][x as usize] = END;

    let mut out = String::with_capacity((WIDTH + 3) * (HEIGHT + 2));
    out.push('+');
    out.push_str(&"-".repeat(WIDTH));
    out.push_str("+\n");
    for row in field.iter() {
        out.push('|');
        for &cell in row.iter() {
            let idx = cell.min((FIELD_CHARS.len() - 1) as u8) as usize;
            out.push(FIELD_CHARS[idx] as char);
        }
        out.push_str("|\n");
    }
    out.push('+');
    out.push_str(&"-".repeat(WIDTH));
    out.push('+');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_bordered_grid() {
        let art = render(b"0123456789abcdef0123456789abcdef");
        let lines: Vec<&str> = art.lines().collect();
        assert_eq!(lines.len(), HEIGHT + 2);
        assert!(lines[0].starts_with('+') && lines[0].ends_with('+'));
        assert_eq!(lines[0].len(), WIDTH + 2);
    }

    #[test]
    fn is_deterministic() {
        let digest = [7u8; 32];
        assert_eq!(render(&digest), render(&digest));
    }

    #[test]
    fn distinct_digests_usually_differ() {
        let a = render(&[1u8; 32]);
        let b = render(&[2u8; 32]);
        assert_ne!(a, b);
    }
}
