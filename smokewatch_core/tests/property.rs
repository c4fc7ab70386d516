use proptest::prelude::*;
use smokewatch_core::alert::{evaluate, z_scores};
use smokewatch_core::frame::{Line, classify_line};
use smokewatch_core::stats::population_baseline;
use smokewatch_core::{Baseline, ChannelStats, PerWavelength, Severity, Wavelength};
use std::time::{Duration, Instant};

fn sample() -> impl Strategy<Value = Option<u32>> + Clone {
    prop_oneof![1 => Just(None), 4 => (1u32..100_000).prop_map(Some)]
}

fn baseline() -> impl Strategy<Value = Option<Baseline>> + Clone {
    prop_oneof![
        1 => Just(None),
        1 => (1.0f64..1000.0).prop_map(|mean| Some(Baseline { mean, std: 0.0 })),
        4 => (1.0f64..1000.0, 0.1f64..100.0).prop_map(|(mean, std)| Some(Baseline { mean, std })),
    ]
}

fn triple<T: std::fmt::Debug>(s: impl Strategy<Value = T> + Clone) -> impl Strategy<Value = PerWavelength<T>> {
    (s.clone(), s.clone(), s).prop_map(|(r, g, ir)| PerWavelength::new(r, g, ir))
}

proptest! {
    #[test]
    fn baseline_matches_naive_population_stats(values in prop::collection::vec(sample(), 1..200)) {
        let samples: Vec<f64> = values.iter().map(|v| v.map_or(f64::NAN, f64::from)).collect();
        let present: Vec<f64> = values.iter().flatten().map(|v| f64::from(*v)).collect();
        match population_baseline(&samples) {
            None => prop_assert!(present.is_empty()),
            Some(b) => {
                let n = present.len() as f64;
                let mean = present.iter().sum::<f64>() / n;
                let var = present.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                prop_assert!((b.mean - mean).abs() <= 1e-6 * mean.abs().max(1.0));
                prop_assert!((b.std - var.sqrt()).abs() <= 1e-6 * var.sqrt().max(1.0));
            }
        }
    }

    #[test]
    fn all_missing_cycle_keeps_previous_baseline(first in 1u32..10_000, cycles in 1usize..5) {
        let t0 = Instant::now();
        let mut stats = ChannelStats::new(t0, Duration::from_secs(1));
        stats.record(&PerWavelength::new(Some(first), Some(first), Some(first)));
        let plan = stats.prepare_recompute();
        stats.commit_recompute(plan, t0, 0);
        let before = *stats.baselines();
        for _ in 0..cycles {
            stats.record(&PerWavelength::new(None, None, None));
            let plan = stats.prepare_recompute();
            stats.commit_recompute(plan, t0, 0);
            prop_assert_eq!(*stats.baselines(), before);
            prop_assert_eq!(stats.buffered(Wavelength::Red), 0);
        }
    }

    #[test]
    fn severities_follow_the_classification_rules(
        values in triple(sample()),
        baselines in triple(baseline()),
        threshold in 0.5f64..10.0,
    ) {
        let alerts = evaluate(&values, &baselines, threshold);
        if !baselines.all(Option::is_some) {
            prop_assert!(alerts.is_empty());
            return Ok(());
        }
        let scores = z_scores(&values, &baselines);
        let over: Vec<bool> = scores.iter().map(|(_, z)| z.is_some_and(|z| z.abs() > threshold)).collect();
        let warning = over.iter().any(|o| *o);
        let critical = over.iter().all(|o| *o);

        let severities: Vec<Severity> = alerts.iter().map(|a| a.severity).collect();
        prop_assert_eq!(severities.contains(&Severity::Warning), warning);
        prop_assert_eq!(severities.contains(&Severity::Critical), critical);
        // Critical never stands alone
        if critical {
            prop_assert_eq!(severities, vec![Severity::Warning, Severity::Critical]);
        }
        for (w, z) in scores.iter() {
            let undefined = values[w].is_none() || baselines[w].is_some_and(|b| b.std == 0.0);
            prop_assert_eq!(z.is_none(), undefined);
        }
    }

    #[test]
    fn parser_never_panics(line in ".{0,128}") {
        let _ = classify_line(&line);
    }

    #[test]
    fn formatted_frames_parse(tag in 0u32..64, r in -5i64..5000, g in -5i64..5000, ir in -5i64..5000) {
        let line = format!("CH:{tag};R:{r};G:{g};IR:{ir}");
        let keep = |v: i64| (v > 0).then(|| u32::try_from(v).unwrap());
        match classify_line(&line) {
            Line::Data(frame) => {
                prop_assert_eq!(frame.channel, Some(tag));
                prop_assert_eq!(frame.values, PerWavelength::new(keep(r), keep(g), keep(ir)));
            }
            other => prop_assert!(false, "unexpected {:?}", other),
        }
    }
}
