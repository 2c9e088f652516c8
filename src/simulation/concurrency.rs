//! Fork-join helpers over the per-field particle arrays.
//!
//! Every closure receives the particle index together with exclusive access to
//! that particle's slots, so the closures only need shared access to the other
//! arrays. Iteration is partitioned by rayon, but each index is processed by
//! exactly one closure call, which keeps per-particle results independent of
//! the thread count.

use rayon::prelude::*;

pub fn par_iter_reduce1<
    T1: Send + Sync,
    F: Fn(usize, &T1) -> X + Send + Sync,
    X: Send,
    C: Fn(X, X) -> X + Send + Sync,
    I: Fn() -> X + Send + Sync,
>(
    arr1: &[T1],
    identity: I,
    combine: C,
    f: F,
) -> X {
    arr1.par_iter()
        .enumerate()
        .map(|(i, a)| f(i, a))
        .reduce(identity, combine)
}

pub fn par_iter_mut1<T1: Send + Sync, F: Fn(usize, &mut T1) + Send + Sync>(arr1: &mut [T1], f: F) {
    arr1.into_par_iter().enumerate().for_each(|(idx, v1)| {
        f(idx, v1);
    });
}

pub fn par_iter_mut2<T1: Send + Sync, T2: Send + Sync, F: Fn(usize, &mut T1, &mut T2) + Send + Sync>(
    arr1: &mut [T1],
    arr2: &mut [T2],
    f: F,
) {
    assert!(arr1.len() == arr2.len());
    arr1.into_par_iter()
        .zip(arr2.into_par_iter())
        .enumerate()
        .for_each(|(idx, (v1, v2))| {
            f(idx, v1, v2);
        });
}

pub fn par_iter_mut3<
    T1: Send + Sync,
    T2: Send + Sync,
    T3: Send + Sync,
    F: Fn(usize, &mut T1, &mut T2, &mut T3) + Send + Sync,
>(
    arr1: &mut [T1],
    arr2: &mut [T2],
    arr3: &mut [T3],
    f: F,
) {
    assert!(arr1.len() == arr2.len() && arr1.len() == arr3.len());
    arr1.into_par_iter()
        .zip(arr2.into_par_iter())
        .zip(arr3.into_par_iter())
        .enumerate()
        .for_each(|(idx, ((v1, v2), v3))| {
            f(idx, v1, v2, v3);
        });
}

#[test]
fn par_iter_mut_visits_every_index_once() {
    let mut a = vec![0usize; 1000];
    let mut b = vec![0usize; 1000];
    let mut c = vec![0usize; 1000];

    par_iter_mut1(&mut a, |i, v| *v += i);
    par_iter_mut2(&mut a, &mut b, |i, va, vb| {
        *vb = *va + i;
    });
    par_iter_mut3(&mut a, &mut b, &mut c, |i, va, vb, vc| {
        *vc = *va + *vb + i;
        *va = 0;
    });

    for i in 0..1000 {
        assert_eq!(a[i], 0);
        assert_eq!(b[i], 2 * i);
        assert_eq!(c[i], 4 * i);
    }

    let max = par_iter_reduce1(&c, || 0, usize::max, |i, v| *v + i);
    assert_eq!(max, 5 * 999);
}
