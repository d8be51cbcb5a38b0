//! End-to-end training behavior: a handful of gradient steps on each factory
//! model must be well-behaved, and simple separable problems must be learned.

use approx::assert_relative_eq;
use neural_factories::layers::DenseLayer;
use neural_factories::losses::Loss;
use neural_factories::metrics::Metric;
use neural_factories::model::Sequential;
use neural_factories::optimizers::OptimizerSpec;
use neural_factories::utils::{Activation, SimpleRng};
use neural_factories::{
    create_image_classifier, create_text_classifier_convolutional,
    create_text_classifier_recurrent, create_toy_sequence_model,
};

fn vocabulary(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("tok{}", i)).collect()
}

#[test]
fn toy_model_loss_decreases() {
    let (mut model, _) = create_toy_sequence_model((4, 2), 1).unwrap();

    // Fixed random batch: 2 samples of 4 steps.
    let mut rng = SimpleRng::new(42);
    let mut input = vec![0.0f32; 2 * 4 * 2];
    rng.fill_uniform(&mut input, -1.0, 1.0);
    let mut targets = vec![0.0f32; 2 * 4];
    rng.fill_uniform(&mut targets, -1.0, 1.0);

    let first = model.train_batch(&input, &targets, 2).unwrap();
    let mut last = first;
    for _ in 0..40 {
        last = model.train_batch(&input, &targets, 2).unwrap();
    }
    assert!(last < first, "loss {} -> {}", first, last);
    assert!(last.is_finite());
}

#[test]
fn convolutional_text_model_learns_token_rule() {
    // Comments starting with token 1 are spam, token 2 are ham; memorizing a
    // two-sample batch is easy at learning rate 0.01.
    let vocab = vocabulary(6);
    let (mut model, _) = create_text_classifier_convolutional(&vocab, 1).unwrap();

    let input = vec![
        1.0, 3.0, 4.0, 0.0, 0.0, //
        2.0, 3.0, 4.0, 0.0, 0.0,
    ];
    let targets = vec![1.0, 0.0];

    let (before, _) = model.evaluate(&input, &targets, 2).unwrap();
    for _ in 0..60 {
        model.train_batch(&input, &targets, 2).unwrap();
    }
    let (loss, metrics) = model.evaluate(&input, &targets, 2).unwrap();
    assert!(loss.is_finite());
    assert!(loss < before, "loss {} -> {}", before, loss);
    let accuracy = metrics
        .iter()
        .find(|(m, _)| *m == Metric::Accuracy)
        .map(|(_, v)| *v)
        .unwrap();
    assert!(accuracy >= 0.5);
}

#[test]
fn recurrent_text_model_trains_without_diverging() {
    let vocab = vocabulary(8);
    let (mut model, _) = create_text_classifier_recurrent(&vocab, 1).unwrap();

    let input = vec![
        1.0, 5.0, 2.0, 0.0, //
        7.0, 3.0, 3.0, 0.0,
    ];
    let targets = vec![1.0, 0.0];

    let (before, _) = model.evaluate(&input, &targets, 2).unwrap();
    for _ in 0..25 {
        model.train_batch(&input, &targets, 2).unwrap();
    }
    let (after, _) = model.evaluate(&input, &targets, 2).unwrap();
    assert!(after.is_finite());
    assert!(after < before, "loss {} -> {}", before, after);
}

#[test]
fn image_model_survives_gradient_steps() {
    let (mut model, _) = create_image_classifier((20, 20, 1), 3).unwrap();

    let mut rng = SimpleRng::new(9);
    let mut input = vec![0.0f32; 20 * 20];
    rng.fill_uniform(&mut input, 0.0, 1.0);
    let targets = vec![0.0, 1.0, 0.0];

    let mut losses = Vec::new();
    for _ in 0..3 {
        losses.push(model.train_batch(&input, &targets, 1).unwrap());
    }
    assert!(losses.iter().all(|l| l.is_finite()));

    // After training steps the output is still a probability distribution.
    let output = model.predict(&input, 1).unwrap();
    let sum: f32 = output.iter().sum();
    assert_relative_eq!(sum, 1.0, epsilon = 1e-3);
}

#[test]
fn dense_softmax_model_learns_separable_classes() {
    // x = -1 belongs to class 0, x = +1 to class 1.
    let mut rng = SimpleRng::new(11);
    let mut model = Sequential::new();
    model.add(Box::new(DenseLayer::new(1, 2, Activation::Softmax, &mut rng)));
    model
        .compile(
            Loss::CategoricalCrossentropy,
            OptimizerSpec::sgd(0.5),
            vec![Metric::Accuracy],
        )
        .unwrap();

    let input = vec![-1.0, 1.0, -1.0, 1.0];
    let targets = vec![1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0];

    for _ in 0..100 {
        model.train_batch(&input, &targets, 4).unwrap();
    }

    let (loss, metrics) = model.evaluate(&input, &targets, 4).unwrap();
    assert!(loss < 0.2, "loss still {}", loss);
    assert_eq!(metrics, vec![(Metric::Accuracy, 1.0)]);
}

#[test]
fn training_switches_back_to_inference_for_predict() {
    // Dropout is active during train_batch but predict must be
    // deterministic: two predictions of the same batch agree.
    let vocab = vocabulary(6);
    let (mut model, _) = create_text_classifier_convolutional(&vocab, 1).unwrap();
    let input = vec![1.0, 2.0, 3.0, 4.0, 5.0];
    let targets = vec![1.0];

    model.train_batch(&input, &targets, 1).unwrap();
    let a = model.predict(&input, 1).unwrap();
    let b = model.predict(&input, 1).unwrap();
    assert_eq!(a, b);
}
