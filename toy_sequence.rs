// toy_sequence.rs
// Trains the toy sequence model on synthetic data: each sample is a sequence
// of pairs (x_t, y_t) and the target at step t is x_{t-3} - y_t (zero while
// t < 3).
//
// Output:
//   - logs/toy_sequence_loss.txt (epoch,loss)
//   - prints per-epoch training loss

use std::fs;
use std::io::{BufWriter, Write};
use std::process;

use neural_factories::create_toy_sequence_model;
use neural_factories::utils::SimpleRng;

const STEPS: usize = 10;
const FEATURES: usize = 2;
const SAMPLES: usize = 64;
const BATCH_SIZE: usize = 8;
const EPOCHS: usize = 20;

fn make_dataset(rng: &mut SimpleRng) -> (Vec<f32>, Vec<f32>) {
    let mut inputs = vec![0.0f32; SAMPLES * STEPS * FEATURES];
    let mut targets = vec![0.0f32; SAMPLES * STEPS];

    for s in 0..SAMPLES {
        for t in 0..STEPS {
            let x = rng.gen_range_f32(-1.0, 1.0);
            let y = rng.gen_range_f32(-1.0, 1.0);
            inputs[(s * STEPS + t) * FEATURES] = x;
            inputs[(s * STEPS + t) * FEATURES + 1] = y;
        }
        for t in 3..STEPS {
            let x_lag = inputs[(s * STEPS + t - 3) * FEATURES];
            let y_now = inputs[(s * STEPS + t) * FEATURES + 1];
            targets[s * STEPS + t] = x_lag - y_now;
        }
    }

    (inputs, targets)
}

fn main() {
    let (mut model, fit_options) = match create_toy_sequence_model((STEPS, FEATURES), 1) {
        Ok(pair) => pair,
        Err(err) => {
            eprintln!("failed to build model: {}", err);
            process::exit(1);
        }
    };
    println!("{}", model.summary());
    if !fit_options.is_empty() {
        println!("fit options: {:?}", fit_options);
    }

    let mut rng = SimpleRng::new(0);
    rng.reseed_from_time();
    let (inputs, targets) = make_dataset(&mut rng);

    if let Err(err) = fs::create_dir_all("logs") {
        eprintln!("failed to create logs directory: {}", err);
        process::exit(1);
    }
    let log = match fs::File::create("logs/toy_sequence_loss.txt") {
        Ok(file) => file,
        Err(err) => {
            eprintln!("failed to open loss log: {}", err);
            process::exit(1);
        }
    };
    let mut log = BufWriter::new(log);

    let sample_in = STEPS * FEATURES;
    let sample_out = STEPS;
    let batches = SAMPLES / BATCH_SIZE;
    let mut order: Vec<usize> = (0..SAMPLES).collect();

    for epoch in 0..EPOCHS {
        rng.shuffle_usize(&mut order);
        let mut epoch_loss = 0.0f32;

        for batch in 0..batches {
            let mut batch_in = Vec::with_capacity(BATCH_SIZE * sample_in);
            let mut batch_out = Vec::with_capacity(BATCH_SIZE * sample_out);
            for &s in &order[batch * BATCH_SIZE..(batch + 1) * BATCH_SIZE] {
                batch_in.extend_from_slice(&inputs[s * sample_in..(s + 1) * sample_in]);
                batch_out.extend_from_slice(&targets[s * sample_out..(s + 1) * sample_out]);
            }

            match model.train_batch(&batch_in, &batch_out, BATCH_SIZE) {
                Ok(loss) => epoch_loss += loss,
                Err(err) => {
                    eprintln!("training failed: {}", err);
                    process::exit(1);
                }
            }
        }

        let mean_loss = epoch_loss / batches as f32;
        println!("epoch {:2}  loss {:.6}", epoch + 1, mean_loss);
        if let Err(err) = writeln!(log, "{},{}", epoch + 1, mean_loss) {
            eprintln!("failed to write loss log: {}", err);
            process::exit(1);
        }
    }
}
