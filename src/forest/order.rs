use bitvec::prelude::BitVec;
use xias::Xias;

/// Corrects externally reported sibling positions into a permutation of `0..reported.len()`.
///
/// `reported[i]` is the position reported for the `i`-th child in the current child list.
/// Reports may contain duplicates or out-of-range values
/// when several reorderings land out of order.
/// If the reports already form a permutation, they are returned unchanged.
/// Otherwise children are stably sorted by reported position,
/// with ties going to the child later in the current list,
/// and each child takes its rank as its new position.
///
/// ```
/// assert_eq!(sylva::forest::correct_positions(&[2, 0, 1, 2]), vec![3, 0, 1, 2]);
/// ```
pub fn correct_positions(reported: &[i32]) -> Vec<usize> {
    if is_permutation(reported) {
        return reported
            .iter()
            .map(|&position| position.homosign::<u32>().small_int::<usize>())
            .collect();
    }

    let mut ranked: Vec<usize> = (0..reported.len()).collect();
    ranked.sort_by(|&a, &b| reported[a].cmp(&reported[b]).then(b.cmp(&a)));

    let mut positions = vec![0; reported.len()];
    for (rank, &original) in ranked.iter().enumerate() {
        positions[original] = rank;
    }
    positions
}

fn is_permutation(reported: &[i32]) -> bool {
    let mut seen: BitVec = BitVec::repeat(false, reported.len());

    for &position in reported {
        let position = match usize::try_from(position) {
            Ok(position) if position < reported.len() => position,
            _ => return false,
        };

        if seen.replace(position, true) {
            return false;
        }
    }

    true
}
