//! Behavioural properties shared by the weight estimators.
//!
//! Order streams are synthetic and deterministic (seeded StdRng, Gaussian scale noise).
//!
//! ## Test Organization
//!
//! 1. **Single-item exactness** - EMA and Kalman move toward and reach the reading
//! 2. **Kalman variance floor** - P never drops below max(R, 0.5·Q)
//! 3. **Bayesian covariance** - symmetric positive-definite after every update, including
//!    a stream of identical multi-item orders
//! 4. **Dimension growth** - idempotent, existing posterior preserved
//! 5. **Convergence** - error after 30 orders no worse than after 5
//! 6. **Missing items** - never learned from
//! 7. **Joint update scenario** - posterior sum lands between prior sum and reading
//! 8. **Classification** - removed product is the top candidate

use std::collections::BTreeMap;

use nalgebra::SymmetricEigen;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use order_weight_estimator::config::{BayesianConfig, EmaConfig, KalmanConfig};
use order_weight_estimator::evaluation::ground_truth;
use order_weight_estimator::{
    build_estimator, BayesianRegressionEstimator, ConvergenceEvaluator, EmaEstimator,
    EstimatorConfig, EstimatorKind, KalmanEstimator, Order, OrderItem, PriorTable, Product,
    ProductId, UpdateOutcome, WeightEstimator,
};

// ============================================================================
// Helper Functions
// ============================================================================

const TRUE_WEIGHTS: [(&str, f64); 6] = [
    ("cinnamon_twists", 50.0),
    ("mexican_rice", 120.0),
    ("soft_taco", 160.0),
    ("quesadilla", 240.0),
    ("burrito", 300.0),
    ("nachos_bellgrande", 470.0),
];

fn truth() -> BTreeMap<ProductId, f64> {
    TRUE_WEIGHTS
        .iter()
        .map(|(id, w)| (ProductId::from(*id), *w))
        .collect()
}

/// Random orders of 1-3 distinct products, 1-2 units each, 2 g scale noise.
fn synthetic_orders(seed: u64, n: usize) -> Vec<Order> {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, 2.0).unwrap();

    (0..n)
        .map(|_| {
            let line_count = if rng.gen_bool(0.4) { 1 } else { rng.gen_range(2..=3) };
            let mut picked: Vec<usize> = Vec::with_capacity(line_count);
            while picked.len() < line_count {
                let i = rng.gen_range(0..TRUE_WEIGHTS.len());
                if !picked.contains(&i) {
                    picked.push(i);
                }
            }

            let items: Vec<OrderItem> = picked
                .iter()
                .map(|&i| OrderItem::new(TRUE_WEIGHTS[i].0, rng.gen_range(1..=2)))
                .collect();
            let total: f64 = items
                .iter()
                .zip(&picked)
                .map(|(item, &i)| TRUE_WEIGHTS[i].1 * item.quantity as f64)
                .sum();
            Order::new(items, total + noise.sample(&mut rng))
        })
        .collect()
}

fn all_estimators() -> Vec<Box<dyn WeightEstimator>> {
    EstimatorKind::ALL
        .iter()
        .map(|&kind| build_estimator(kind, &EstimatorConfig::default(), PriorTable::default()))
        .collect()
}

fn mean_abs_error(estimator: &dyn WeightEstimator, truth: &BTreeMap<ProductId, f64>) -> f64 {
    truth
        .iter()
        .map(|(id, w)| (estimator.infer_item_weight(id) - w).abs())
        .sum::<f64>()
        / truth.len() as f64
}

// ============================================================================
// 1. Single-item exactness
// ============================================================================

#[test]
fn test_single_item_orders_converge_to_reading() {
    let mut estimators: Vec<Box<dyn WeightEstimator>> = vec![
        Box::new(EmaEstimator::new(EmaConfig::default(), PriorTable::default())),
        Box::new(KalmanEstimator::new(KalmanConfig::default(), PriorTable::default())),
    ];
    let id = ProductId::from("soft_taco");
    let order = Order::new(vec![OrderItem::new("soft_taco", 1)], 160.0);

    for estimator in estimators.iter_mut() {
        let mut previous_gap = (estimator.infer_item_weight(&id) - 160.0).abs();
        for step in 0..100 {
            estimator.update(&order, 160.0).unwrap();
            let estimate = estimator.infer_item_weight(&id);
            let gap = (estimate - 160.0).abs();
            assert!(
                estimate >= 160.0 - 1e-9,
                "{} overshot to {estimate} at step {step}",
                estimator.name()
            );
            assert!(
                gap < previous_gap || gap < 1e-9,
                "{} did not move toward the reading at step {step}: {gap} >= {previous_gap}",
                estimator.name()
            );
            previous_gap = gap;
        }
        assert!(previous_gap < 1e-3, "{} stalled at gap {previous_gap}", estimator.name());
    }
}

// ============================================================================
// 2. Kalman variance floor
// ============================================================================

#[test]
fn test_kalman_variance_floor_on_random_stream() {
    let config = KalmanConfig::default();
    let floor = config.variance_floor();
    let mut kalman = KalmanEstimator::new(config, PriorTable::default());

    for order in synthetic_orders(7, 400) {
        kalman.update(&order, order.measured_weight).unwrap();
        for (id, filter) in &kalman.state().filters {
            assert!(filter.p >= floor, "{id}: P = {} below floor {floor}", filter.p);
        }
    }
}

// ============================================================================
// 3. Bayesian covariance stays SPD
// ============================================================================

#[test]
fn test_bayesian_covariance_symmetric_positive_definite() {
    let mut bayes = BayesianRegressionEstimator::new(BayesianConfig::default(), PriorTable::default());

    for (n, order) in synthetic_orders(11, 300).iter().enumerate() {
        let outcome = bayes.update(order, order.measured_weight).unwrap();
        assert_eq!(outcome, UpdateOutcome::Applied);

        let cov = bayes.covariance();
        let asymmetry = (cov - cov.transpose()).amax();
        assert!(asymmetry <= 1e-9 * cov.amax(), "order {n}: asymmetry {asymmetry}");

        let eigen = SymmetricEigen::new(cov.clone());
        let min_eigenvalue = eigen.eigenvalues.min();
        assert!(min_eigenvalue > 0.0, "order {n}: min eigenvalue {min_eigenvalue}");
    }
}

#[test]
fn test_bayesian_covariance_spd_under_repeated_identical_orders() {
    let mut bayes = BayesianRegressionEstimator::new(BayesianConfig::default(), PriorTable::default());
    let order = Order::new(vec![OrderItem::new("a", 1), OrderItem::new("b", 1)], 300.0);

    for n in 0..500 {
        let outcome = bayes.update(&order, 300.0).unwrap();
        assert_eq!(outcome, UpdateOutcome::Applied, "order {n}");

        let cov = bayes.covariance();
        let asymmetry = (cov - cov.transpose()).amax();
        assert!(asymmetry <= 1e-9 * cov.amax(), "order {n}: asymmetry {asymmetry}");

        let min_eigenvalue = SymmetricEigen::new(cov.clone()).eigenvalues.min();
        assert!(min_eigenvalue > 0.0, "order {n}: min eigenvalue {min_eigenvalue}");
    }

    // only a + b is identified; a - b keeps its prior spread
    let cov = bayes.covariance();
    let sum_variance = cov[(0, 0)] + cov[(1, 1)] + 2.0 * cov[(0, 1)];
    let diff_variance = cov[(0, 0)] + cov[(1, 1)] - 2.0 * cov[(0, 1)];
    assert!(sum_variance < 10.0, "sum variance {sum_variance}");
    assert!((diff_variance - 400.0).abs() < 1e-6 * 400.0, "diff variance {diff_variance}");
}

// ============================================================================
// 4. Dimension growth idempotence
// ============================================================================

#[test]
fn test_dimension_growth_idempotent() {
    let mut bayes = BayesianRegressionEstimator::new(BayesianConfig::default(), PriorTable::default());
    for order in synthetic_orders(3, 20) {
        bayes.update(&order, order.measured_weight).unwrap();
    }
    let dimension = bayes.dimension();
    let before = bayes.state();

    for id in before.product_ids.clone() {
        bayes.ensure_product(&id);
    }
    assert_eq!(bayes.dimension(), dimension);
    assert_eq!(bayes.state(), before);

    bayes.ensure_product(&"new_item".into());
    bayes.ensure_product(&"new_item".into());
    assert_eq!(bayes.dimension(), dimension + 1);

    let after = bayes.state();
    for (i, mean) in before.mean.iter().enumerate() {
        assert_eq!(after.mean[i], *mean);
    }
}

// ============================================================================
// 5. Convergence monotonic improvement
// ============================================================================

#[test]
fn test_error_after_30_orders_not_worse_than_after_5() {
    let truth = truth();
    let orders = synthetic_orders(42, 30);

    for mut estimator in all_estimators() {
        let mut error_at_5 = f64::NAN;
        for (i, order) in orders.iter().enumerate() {
            estimator.update(order, order.measured_weight).unwrap();
            if i + 1 == 5 {
                error_at_5 = mean_abs_error(estimator.as_ref(), &truth);
            }
        }
        let error_at_30 = mean_abs_error(estimator.as_ref(), &truth);
        assert!(
            error_at_30 <= error_at_5,
            "{}: error grew from {error_at_5:.2} to {error_at_30:.2}",
            estimator.name()
        );
    }
}

#[test]
fn test_evaluator_ranks_all_estimators() {
    let catalog: Vec<Product> = TRUE_WEIGHTS
        .iter()
        .map(|(id, w)| {
            let mut p = Product::new(*id, (w - 20.0, w + 10.0));
            p.mean_weight = Some(*w);
            p
        })
        .collect();
    let priors = PriorTable::from_catalog(&catalog, 200.0);
    let mut estimators: Vec<Box<dyn WeightEstimator>> = EstimatorKind::ALL
        .iter()
        .map(|&kind| build_estimator(kind, &EstimatorConfig::default(), priors.clone()))
        .collect();

    let orders = synthetic_orders(5, 400);
    let reports = ConvergenceEvaluator::default().evaluate_all(
        &mut estimators,
        &orders,
        &ground_truth(&catalog),
    );

    assert_eq!(reports.len(), 3);
    assert!(reports[0].converged_count > 0, "best report: {:?}", reports[0]);
    for report in &reports {
        assert_eq!(report.product_count(), TRUE_WEIGHTS.len());
        assert_eq!(report.degenerate_updates, 0);
        if let Some(mean) = report.mean_convergence_order {
            assert!(mean >= 1.0 && mean <= report.orders_processed as f64);
        }
    }
    for pair in reports.windows(2) {
        if let (Some(a), Some(b)) = (pair[0].score(), pair[1].score()) {
            assert!(a <= b, "ranking out of order: {a} > {b}");
        }
    }
}

// ============================================================================
// 6. Missing-item no-learning rule
// ============================================================================

#[test]
fn test_missing_item_orders_never_learned() {
    let training = synthetic_orders(9, 25);
    let mut missing = training[0].clone();
    missing.items[0].missing = true;

    let mut ema = EmaEstimator::new(EmaConfig::default(), PriorTable::default());
    let mut kalman = KalmanEstimator::new(KalmanConfig::default(), PriorTable::default());
    let mut bayes = BayesianRegressionEstimator::new(BayesianConfig::default(), PriorTable::default());
    for order in &training {
        ema.update(order, order.measured_weight).unwrap();
        kalman.update(order, order.measured_weight).unwrap();
        bayes.update(order, order.measured_weight).unwrap();
    }

    let ema_before = ema.state().clone();
    let kalman_before = kalman.state().clone();
    let bayes_before = bayes.state();

    assert!(matches!(
        ema.update(&missing, missing.measured_weight).unwrap(),
        UpdateOutcome::Ignored(_)
    ));
    assert!(matches!(
        kalman.update(&missing, missing.measured_weight).unwrap(),
        UpdateOutcome::Ignored(_)
    ));
    assert!(matches!(
        bayes.update(&missing, missing.measured_weight).unwrap(),
        UpdateOutcome::Ignored(_)
    ));

    assert_eq!(ema.state(), &ema_before);
    assert_eq!(kalman.state(), &kalman_before);
    assert_eq!(bayes.state(), bayes_before);
}

// ============================================================================
// 7. Joint update scenario
// ============================================================================

#[test]
fn test_joint_update_lands_between_prior_and_reading() {
    let priors = PriorTable::default().with_mean("a", 200.0).with_mean("b", 100.0);
    let mut bayes = BayesianRegressionEstimator::new(BayesianConfig::default(), priors);
    let order = Order::new(vec![OrderItem::new("a", 1), OrderItem::new("b", 1)], 310.0);

    bayes.update(&order, 310.0).unwrap();

    let sum = bayes.infer_item_weight(&"a".into()) + bayes.infer_item_weight(&"b".into());
    assert!(sum > 300.0 && sum < 310.0, "posterior sum {sum}");
}

// ============================================================================
// 8. Missing-item classification
// ============================================================================

#[test]
fn test_removed_product_is_top_candidate() {
    let weights = [("a", 320.0), ("b", 180.0), ("c", 90.0)];
    let catalog: Vec<Product> = weights
        .iter()
        .map(|(id, w)| Product::new(*id, (w - 15.0, w + 15.0)))
        .collect();
    let mut bayes = BayesianRegressionEstimator::new(
        BayesianConfig::default(),
        PriorTable::from_catalog(&catalog, 200.0),
    );

    let mut rng = StdRng::seed_from_u64(2024);
    let noise = Normal::new(0.0, 2.0).unwrap();
    for _ in 0..30 {
        for mask in [0b001u8, 0b010, 0b100, 0b011, 0b110, 0b111] {
            let mut items = Vec::new();
            let mut total = 0.0;
            for (bit, (id, w)) in weights.iter().enumerate() {
                if mask & (1 << bit) != 0 {
                    items.push(OrderItem::new(*id, 1));
                    total += w;
                }
            }
            let measured = total + noise.sample(&mut rng);
            bayes.update(&Order::new(items, measured), measured).unwrap();
        }
    }
    for (id, _) in &weights {
        assert!(bayes.observation_count(&(*id).into()) >= 20);
    }

    let expected = Order::new(
        vec![OrderItem::new("a", 1), OrderItem::new("b", 1), OrderItem::new("c", 1)],
        0.0,
    );
    let measured = 320.0 + 90.0 + noise.sample(&mut rng);
    let report = bayes.classify(&expected, measured).unwrap();

    let top = report
        .most_likely_missing()
        .unwrap_or_else(|| panic!("no candidates: {report:?}"));
    assert_eq!(top.product_id.as_str(), "b");
    assert!(top.probability > 0.5, "probability {}", top.probability);
    assert!(report.top_missing_candidates.len() <= 3);

    let complete = bayes.classify(&expected, 590.0).unwrap();
    assert!(complete.is_complete(), "complete order flagged: {complete:?}");
}
