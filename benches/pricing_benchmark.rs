use chrono::NaiveDate;
use concierge_core::config::{BusinessRules, PricingConfig};
use concierge_core::models::RoomOccupancy;
use concierge_core::pricing::calculate_pricing;
use concierge_core::rules::validate_stay;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// Quoting happens once per rate per availability response, so the pricing
// path is the hottest pure computation in the crate.
pub fn pricing_benchmark(c: &mut Criterion) {
    let config = PricingConfig::default();
    let today = date(2025, 6, 1);

    let mut group = c.benchmark_group("pricing_calculation");
    for nights in [1u64, 7, 30].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(nights), nights, |b, &nights| {
            let checkin = date(2025, 7, 1);
            let checkout = checkin + chrono::Duration::days(nights as i64);
            b.iter(|| {
                black_box(calculate_pricing(
                    black_box(&config),
                    black_box(20_000),
                    checkin,
                    checkout,
                    today,
                ))
            });
        });
    }
    group.finish();

    // A spread of stays with randomized rates, the shape of quoting a full
    // availability response
    c.bench_function("pricing_quote_batch", |b| {
        let mut rng = StdRng::seed_from_u64(7);
        let stays: Vec<(i64, NaiveDate, NaiveDate)> = (0..64)
            .map(|i| {
                let checkin = date(2025, 7, 1) + chrono::Duration::days(i % 28);
                let checkout = checkin + chrono::Duration::days(rng.gen_range(1..14));
                (rng.gen_range(8_000..60_000), checkin, checkout)
            })
            .collect();
        b.iter(|| {
            for (rate, checkin, checkout) in &stays {
                black_box(calculate_pricing(&config, *rate, *checkin, *checkout, today));
            }
        });
    });
}

pub fn rules_benchmark(c: &mut Criterion) {
    let rules = BusinessRules {
        blackout_ranges: vec![
            (date(2025, 12, 24), date(2025, 12, 26)),
            (date(2025, 7, 4), date(2025, 7, 4)),
        ],
        ..BusinessRules::default()
    };
    let today = date(2025, 6, 1);

    c.bench_function("stay_validation", |b| {
        b.iter(|| {
            black_box(validate_stay(
                black_box(&rules),
                date(2025, 7, 10),
                date(2025, 7, 13),
                RoomOccupancy {
                    adults: 2,
                    children: 1,
                },
                Some("deluxe"),
                today,
            ))
        })
    });
}

criterion_group!(benches, pricing_benchmark, rules_benchmark);
criterion_main!(benches);
