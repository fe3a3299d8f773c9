use rand::Rng;

/// Three distinct member indices with `ind1 < ind2`
///
/// Each pick draws from a range one smaller than the previous one and is then
/// shifted past the indices already taken. `pop_size` must be at least 3.
pub(crate) fn distinct_parents<R: Rng + ?Sized>(pop_size: usize, rng: &mut R) -> [usize; 3] {
    debug_assert!(pop_size >= 3);
    let mut ind1 = rng.random_range(0..pop_size);
    let mut ind2 = rng.random_range(0..pop_size - 1);
    let mut ind3 = rng.random_range(0..pop_size - 2);
    if ind2 >= ind1 {
        ind2 += 1;
        if ind3 >= ind1 {
            ind3 += 1;
        }
        if ind3 >= ind2 {
            ind3 += 1;
        }
    } else {
        if ind3 >= ind2 {
            ind3 += 1;
        }
        if ind3 >= ind1 {
            ind3 += 1;
        }
    }
    if ind2 < ind1 {
        std::mem::swap(&mut ind1, &mut ind2);
    }
    [ind1, ind2, ind3]
}

/// Low-ranked member the third parent is compared with
pub(crate) fn comparison_index(ind3: usize) -> usize {
    if ind3 == 0 {
        1
    } else {
        (0.1 * ind3 as f64).round() as usize
    }
}
