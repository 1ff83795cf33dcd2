use crate::models::BinaryMask;

/// Guo-Hall thinning.
///
/// Repeatedly peels boundary pixels in two alternating sub-passes until nothing
/// changes, leaving a one pixel wide, 8-connected centreline. Connectivity is
/// counted over 8-neighbours, so staircase diagonals thin to one pixel per step
/// and no component disappears entirely. Pixels outside the image are
/// background. The result is always a subset of `mask`.
pub fn skeletonize(mask: &BinaryMask) -> BinaryMask {
    let (width, height) = mask.dimensions();
    let mut skeleton = mask.clone();
    let mut marked: Vec<(u32, u32)> = Vec::new();

    loop {
        let mut changed = false;

        for pass in 0..2 {
            marked.clear();

            for y in 0..height {
                for x in 0..width {
                    if skeleton.is_set(x, y) && is_removable(&skeleton, x, y, pass) {
                        marked.push((x, y));
                    }
                }
            }

            for &(x, y) in &marked {
                skeleton.set(x, y, false);
            }
            changed |= !marked.is_empty();
        }

        if !changed {
            break;
        }
    }

    skeleton
}

/// Neighbours P2..P9, clockwise starting north
fn neighbours(mask: &BinaryMask, x: u32, y: u32) -> [bool; 8] {
    const OFFSETS: [(i64, i64); 8] = [
        (0, -1),
        (1, -1),
        (1, 0),
        (1, 1),
        (0, 1),
        (-1, 1),
        (-1, 0),
        (-1, -1),
    ];

    let (width, height) = mask.dimensions();
    let mut out = [false; 8];
    for (slot, (dx, dy)) in out.iter_mut().zip(OFFSETS) {
        let nx = x as i64 + dx;
        let ny = y as i64 + dy;
        *slot = nx >= 0
            && ny >= 0
            && nx < width as i64
            && ny < height as i64
            && mask.is_set(nx as u32, ny as u32);
    }
    out
}

fn is_removable(mask: &BinaryMask, x: u32, y: u32, pass: usize) -> bool {
    let [p2, p3, p4, p5, p6, p7, p8, p9] = neighbours(mask, x, y).map(u8::from);

    // 8-connected foreground runs around the ring
    let runs = ((p2 ^ 1) & (p3 | p4))
        + ((p4 ^ 1) & (p5 | p6))
        + ((p6 ^ 1) & (p7 | p8))
        + ((p8 ^ 1) & (p9 | p2));
    if runs != 1 {
        return false;
    }

    let n1 = (p9 | p2) + (p3 | p4) + (p5 | p6) + (p7 | p8);
    let n2 = (p2 | p3) + (p4 | p5) + (p6 | p7) + (p8 | p9);
    if !(2..=3).contains(&n1.min(n2)) {
        return false;
    }

    let side = if pass == 0 {
        (p6 | p7 | (p9 ^ 1)) & p8
    } else {
        (p2 | p3 | (p5 ^ 1)) & p4
    };
    side == 0
}
