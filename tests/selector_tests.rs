/// Selector integration tests: determinism and shape of seeded picks.

use chrono::NaiveDate;
use shot_oracle::core::selector::{derive_seed, select, select_one, SelectionKey};
use std::collections::HashSet;

fn key(record: &str) -> SelectionKey {
    SelectionKey::new()
        .identity("1007")
        .content(record)
        .date(NaiveDate::from_ymd_opt(2024, 12, 1).unwrap())
}

fn assert_valid(picked: &[usize], domain: usize, k: usize) {
    assert_eq!(picked.len(), k.min(domain));
    assert!(picked.iter().all(|&i| i < domain));
    assert!(picked.windows(2).all(|w| w[0] < w[1]), "{:?}", picked);
}

#[test]
fn two_records_same_identity() {
    let a = select(&key("shot-a"), 98, 3);
    let b = select(&key("shot-b"), 98, 3);
    assert_valid(&a, 98, 3);
    assert_valid(&b, 98, 3);

    assert_eq!(select(&key("shot-a"), 98, 3), a);
    assert_eq!(select(&key("shot-b"), 98, 3), b);
}

#[test]
fn equal_keys_built_separately_agree() {
    let first = key("shot-a").bank("chill");
    let second = SelectionKey::new()
        .bank("chill")
        .date_token("20241201")
        .content("shot-a")
        .identity("1007");
    assert_eq!(first.to_string(), second.to_string());
    assert_eq!(select(&first, 50, 5), select(&second, 50, 5));
}

#[test]
fn no_repeats_across_many_identities() {
    for month in 1..=12 {
        for day in [1, 9, 17, 28] {
            let identity = format!("{:02}{:02}", month, day);
            let picked = select(&SelectionKey::new().identity(identity.as_str()), 15, 3);
            assert_valid(&picked, 15, 3);
            let unique: HashSet<_> = picked.iter().collect();
            assert_eq!(unique.len(), 3);
        }
    }
}

#[test]
fn identities_spread_over_the_palette() {
    let mut seen = HashSet::new();
    for day in 1..=28 {
        let identity = format!("03{:02}", day);
        seen.extend(select(&SelectionKey::new().identity(identity.as_str()), 15, 3));
    }
    // 84 draws over 15 slots should touch most of them
    assert!(seen.len() >= 10, "only {} distinct indices", seen.len());
}

#[test]
fn saturation_and_empty_domain() {
    let k = key("shot-a");
    assert_eq!(select(&k, 3, 3), vec![0, 1, 2]);
    assert_eq!(select(&k, 3, 7), vec![0, 1, 2]);
    assert_eq!(select(&k, 0, 1), Vec::<usize>::new());
    assert_eq!(select_one(&k, 0), None);
}

#[test]
fn slot_keys_are_independent_draws() {
    let base = key("shot-a").bank("chill");
    let seeds: HashSet<u64> = (0..4)
        .map(|pos| derive_seed(&base.slot(format!("opener#{}", pos)).to_string()))
        .collect();
    assert_eq!(seeds.len(), 4);
}

#[test]
fn known_keys_draw_known_indices() {
    assert_eq!(select(&SelectionKey::new().identity("1007"), 98, 3), vec![14, 32, 61]);
    assert_eq!(select(&key("shot-a"), 98, 3), vec![9, 12, 52]);
}

#[test]
fn seed_is_fixed_for_a_known_key() {
    // sha256("abc") = ba7816bf 8f01cfea ...
    assert_eq!(derive_seed("abc"), 0xba78_16bf_8f01_cfea);
}
