//! Train a Small Chain on XOR
//!
//! Drives the layer protocol the way a training loop would: forward the
//! batch, compute an MSE loss and its gradient, backpropagate through the
//! chain, then apply plain SGD to every parametric layer.
//!
//! ## Usage
//!
//! ```bash
//! # Default 2-4-1 network with tanh hidden units
//! cargo run --release --example train_xor
//!
//! # Wider hidden layer, different activation, debug logging from the layers
//! RUST_LOG=knets=debug cargo run --release --example train_xor -- \
//!     --hidden 8 --activation relu --epochs 500
//!
//! # Architecture from a JSON file (see knets::config)
//! cargo run --release --example train_xor -- --config xor.json
//! ```

use clap::Parser;
use env_logger::Env;
use knets::config::{InitializerConfig, LayerConfig};
use knets::gradients::{compute_grad_norm, BIAS, WEIGHT};
use knets::initializer::InitializerSpec;
use knets::{load_config, Chain, ChainConfig, Gradients, Tensor};
use log::info;
use std::error::Error;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "train_xor", about = "Train a dense chain on XOR with SGD")]
struct Args {
    /// JSON chain configuration (overrides the architecture flags)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Hidden layer width
    #[arg(long, default_value_t = 4)]
    hidden: usize,

    /// Hidden layer activation
    #[arg(long, default_value = "tanh")]
    activation: String,

    /// Number of full-batch updates
    #[arg(long, default_value_t = 2000)]
    epochs: usize,

    /// SGD learning rate
    #[arg(long, default_value_t = 0.5)]
    lr: f32,

    /// Seed for the weight initializers
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Log progress every N epochs
    #[arg(long, default_value_t = 200)]
    log_every: usize,
}

fn flag_config(args: &Args) -> ChainConfig {
    let mut config = ChainConfig::mlp(&[2, args.hidden, 1], &args.activation, "sigmoid");
    for (i, layer) in config.layers.iter_mut().enumerate() {
        if let LayerConfig::Dense {
            weight_initializer, ..
        } = layer
        {
            *weight_initializer = Some(InitializerConfig::Spec(InitializerSpec::XavierUniform {
                seed: Some(args.seed + i as u64),
            }));
        }
    }
    config
}

/// Mean squared error and its gradient with respect to the prediction
fn mse(prediction: &Tensor, target: &Tensor) -> Result<(f32, Tensor), Box<dyn Error>> {
    let diff = prediction.sub(target)?;
    let n = diff.len() as f32;
    Ok((diff.sum_squares() / n, diff.mul_scalar(2.0 / n)))
}

fn sgd_step(chain: &mut Chain, grads: &[Gradients], lr: f32) {
    for (layer, layer_grads) in chain.layers_mut().iter_mut().zip(grads) {
        let Some(params) = layer.params_mut() else {
            continue;
        };
        if let Some(grad) = layer_grads.get(WEIGHT) {
            for (w, g) in params.weight_mut().data.iter_mut().zip(&grad.data) {
                *w -= lr * g;
            }
        }
        if let (Some(bias), Some(grad)) = (params.bias_mut(), layer_grads.get(BIAS)) {
            for (b, g) in bias.data.iter_mut().zip(&grad.data) {
                *b -= lr * g;
            }
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => flag_config(&args),
    };
    let mut chain = config.build()?;
    info!(
        "built chain: {} layers, {} parameters",
        chain.len(),
        chain.parameter_count()
    );

    let x = Tensor::from_rows(&[
        vec![0.0, 0.0],
        vec![0.0, 1.0],
        vec![1.0, 0.0],
        vec![1.0, 1.0],
    ])?;
    let y = Tensor::from_rows(&[vec![0.0], vec![1.0], vec![1.0], vec![0.0]])?;

    for epoch in 1..=args.epochs {
        let prediction = chain.forward(x.clone())?;
        let (loss, grad) = mse(prediction.read(), &y)?;
        let grads = chain.backward(grad)?;
        sgd_step(&mut chain, &grads, args.lr);

        if epoch == 1 || epoch % args.log_every.max(1) == 0 {
            info!(
                "epoch {:>5} | loss {:.6} | grad norm {:.6}",
                epoch,
                loss,
                compute_grad_norm(&grads)
            );
        }
    }

    let prediction = chain.forward(x.clone())?;
    for (row, out) in prediction.read().data.iter().enumerate() {
        println!(
            "{:?} -> {:.4} (target {})",
            &x.data[row * 2..row * 2 + 2],
            out,
            y.data[row]
        );
    }
    Ok(())
}
