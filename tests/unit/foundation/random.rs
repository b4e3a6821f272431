use super::*;

#[test]
fn rng_is_deterministic() {
    let mut a = Rng64::new(123);
    let mut b = Rng64::new(123);
    for _ in 0..32 {
        assert_eq!(a.next_u64(), b.next_u64());
    }
}

#[test]
fn uniform_stays_in_range() {
    let mut rng = Rng64::new(7);
    for _ in 0..1000 {
        let v = rng.uniform(1.0 / 3.0, 0.5);
        assert!((1.0 / 3.0..=0.5).contains(&v));
        let i = rng.int_inclusive(-3, 4);
        assert!((-3..=4).contains(&i));
    }
    assert_eq!(rng.int_inclusive(5, 5), 5);
    assert_eq!(rng.uniform(2.0, 1.0), 2.0);
}

#[test]
fn shuffle_is_a_permutation() {
    let mut rng = Rng64::new(99);
    let mut v: Vec<u32> = (0..20).collect();
    shuffle(&mut v, &mut rng);
    let mut sorted = v.clone();
    sorted.sort();
    assert_eq!(sorted, (0..20).collect::<Vec<_>>());
}
