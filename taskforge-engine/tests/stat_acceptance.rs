use rand::SeedableRng;
use rand::rngs::SmallRng;
use std::convert::TryFrom;
use taskforge_engine::{MoneyRange, ObjectiveSpec};

const TOLERANCE: f64 = 0.01;

fn rate(triggered: usize, trials: usize) -> f64 {
    let triggered = f64::from(u32::try_from(triggered).expect("count fits"));
    let trials = f64::from(u32::try_from(trials).expect("trials fit"));
    triggered / trials
}

#[test]
fn certain_objectives_always_trigger() {
    let spec = ObjectiveSpec::new(1.0, MoneyRange::default(), 100.0);
    let mut rng = SmallRng::seed_from_u64(1);
    assert!((0..10_000).all(|_| spec.should_trigger(&mut rng)));
}

#[test]
fn impossible_objectives_never_trigger() {
    let spec = ObjectiveSpec::new(1.0, MoneyRange::default(), 0.0);
    let mut rng = SmallRng::seed_from_u64(2);
    assert!(!(0..10_000).any(|_| spec.should_trigger(&mut rng)));

    let negative = ObjectiveSpec::new(1.0, MoneyRange::default(), -20.0);
    assert!(!(0..1_000).any(|_| negative.should_trigger(&mut rng)));
}

#[test]
fn coin_flip_objectives_trigger_half_the_time() {
    const TRIALS: usize = 100_000;
    for seed in [3_u64, 0xC0FFEE, 0xDEAD_BEEF] {
        let spec = ObjectiveSpec::new(1.0, MoneyRange::default(), 50.0);
        let mut rng = SmallRng::seed_from_u64(seed);
        let triggered = (0..TRIALS).filter(|_| spec.should_trigger(&mut rng)).count();
        let observed = rate(triggered, TRIALS);
        assert!(
            (observed - 0.5).abs() <= TOLERANCE,
            "seed {seed}: observed trigger rate {observed:.4}"
        );
    }
}

#[test]
fn low_chance_objectives_track_their_rate() {
    const TRIALS: usize = 100_000;
    let spec = ObjectiveSpec::new(1.0, MoneyRange::default(), 5.0);
    let mut rng = SmallRng::seed_from_u64(99);
    let triggered = (0..TRIALS).filter(|_| spec.should_trigger(&mut rng)).count();
    assert!((rate(triggered, TRIALS) - 0.05).abs() <= 0.005);
}

#[test]
fn money_ranges_cover_both_halves() {
    const TRIALS: usize = 20_000;
    let range = MoneyRange { min: 2.0, max: 4.0 };
    let mut rng = SmallRng::seed_from_u64(5);
    let draws: Vec<f64> = (0..TRIALS).map(|_| range.roll(&mut rng)).collect();
    assert!(draws.iter().all(|draw| (2.0..=4.0).contains(draw)));
    let low = draws.iter().filter(|draw| **draw < 3.0).count();
    assert!((rate(low, TRIALS) - 0.5).abs() <= 0.02);
}
