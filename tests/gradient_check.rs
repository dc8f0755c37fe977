// Numerical gradient checks using central finite differences.
// For a fixed upstream gradient r, the loss L(y) = Σ y ⊙ r has dL/dy = r, so the
// gradients returned by backward must match (L(θ + ε) - L(θ - ε)) / 2ε.

use approx::{assert_abs_diff_eq, assert_relative_eq};
use knets::activation::{Elu, Sigmoid, Softplus, Tanh};
use knets::initializer::{RandomUniform, XavierUniform};
use knets::{ActivationLayer, Chain, Dense, Layer, LayerError, Signal, Tensor};

const EPS: f32 = 1e-2;
const TOL: f32 = 2e-3;

fn upstream_gradient(shape: Vec<usize>) -> Tensor {
    let n: usize = shape.iter().product();
    let data = (0..n).map(|i| ((i * 7 % 5) as f32 - 2.0) * 0.3).collect();
    Tensor::new(data, shape)
}

fn input() -> Tensor {
    Tensor::from_rows(&[
        vec![0.5, -1.0, 0.25],
        vec![-0.3, 0.8, 1.2],
        vec![1.5, 0.1, -0.7],
    ])
    .unwrap()
}

fn loss(y: &Tensor, r: &Tensor) -> f32 {
    y.data.iter().zip(&r.data).map(|(a, b)| a * b).sum()
}

fn chain_loss(chain: &mut Chain, x: &Tensor, r: &Tensor) -> f32 {
    let y = chain.forward(x.clone()).unwrap();
    loss(y.read(), r)
}

fn smooth_chain() -> Chain {
    Chain::new()
        .with(
            Dense::builder(3, 4)
                .activation(Tanh)
                .weight_initializer(XavierUniform::new().with_seed(11))
                .bias_initializer(RandomUniform::new(-0.2, 0.2).unwrap().with_seed(5))
                .build()
                .unwrap(),
        )
        .unwrap()
        .with(ActivationLayer::new(Softplus))
        .unwrap()
        .with(
            Dense::builder(4, 2)
                .activation(Sigmoid)
                .weight_initializer(XavierUniform::new().with_seed(12))
                .build()
                .unwrap(),
        )
        .unwrap()
}

#[derive(Clone, Copy)]
enum Param {
    Weight,
    Bias,
}

fn nudge(chain: &mut Chain, layer: usize, param: Param, k: usize, delta: f32) {
    let params = chain.layers_mut()[layer].params_mut().unwrap();
    let tensor = match param {
        Param::Weight => params.weight_mut(),
        Param::Bias => params.bias_mut().unwrap(),
    };
    tensor.data[k] += delta;
}

fn numeric_param_grad(
    chain: &mut Chain,
    x: &Tensor,
    r: &Tensor,
    layer: usize,
    param: Param,
    k: usize,
) -> f32 {
    nudge(chain, layer, param, k, EPS);
    let plus = chain_loss(chain, x, r);
    nudge(chain, layer, param, k, -2.0 * EPS);
    let minus = chain_loss(chain, x, r);
    nudge(chain, layer, param, k, EPS);
    (plus - minus) / (2.0 * EPS)
}

#[test]
fn test_chain_parameter_gradients_match_finite_differences() {
    let mut chain = smooth_chain();
    let x = input();
    let r = upstream_gradient(vec![3, 2]);

    chain.forward(x.clone()).unwrap();
    let grads = chain.backward(r.clone()).unwrap();
    assert!(grads[1].is_empty());

    for layer in [0, 2] {
        let weight = grads[layer].weight().unwrap().clone();
        for k in 0..weight.len() {
            let numeric = numeric_param_grad(&mut chain, &x, &r, layer, Param::Weight, k);
            assert_abs_diff_eq!(weight.data[k], numeric, epsilon = TOL);
        }
        let bias = grads[layer].bias().unwrap().clone();
        for k in 0..bias.len() {
            let numeric = numeric_param_grad(&mut chain, &x, &r, layer, Param::Bias, k);
            assert_abs_diff_eq!(bias.data[k], numeric, epsilon = TOL);
        }
    }
}

#[test]
fn test_chain_input_gradient_matches_finite_differences() {
    let mut chain = smooth_chain();
    let x = input();
    let r = upstream_gradient(vec![3, 2]);

    chain.forward(x.clone()).unwrap();
    chain.backward(r.clone()).unwrap();
    let analytic = chain.input_gradient().unwrap().clone();
    assert_eq!(analytic.shape, x.shape);

    for k in 0..x.len() {
        let mut plus = x.clone();
        plus.data[k] += EPS;
        let mut minus = x.clone();
        minus.data[k] -= EPS;
        let numeric =
            (chain_loss(&mut chain, &plus, &r) - chain_loss(&mut chain, &minus, &r)) / (2.0 * EPS);
        assert_abs_diff_eq!(analytic.data[k], numeric, epsilon = TOL);
    }
}

#[test]
fn test_elu_dense_gradients() {
    let mut layer = Dense::builder(3, 3)
        .activation(Elu { alpha: 1.0 })
        .weight_initializer(XavierUniform::new().with_seed(2))
        .build()
        .unwrap();
    let x = input();
    let r = upstream_gradient(vec![3, 3]);

    layer.call(x.clone()).unwrap();
    layer.set_output_error(r.clone()).unwrap();
    let grads = layer.backward().unwrap();
    let grad_w = grads.weight().unwrap().clone();

    for k in 0..grad_w.len() {
        let mut eval = |delta: f32| {
            layer.params_mut().unwrap().weight_mut().data[k] += delta;
            let y = layer.call(x.clone()).unwrap().read().clone();
            layer.params_mut().unwrap().weight_mut().data[k] -= delta;
            loss(&y, &r)
        };
        let plus = eval(EPS);
        let minus = eval(-EPS);
        let numeric = (plus - minus) / (2.0 * EPS);
        assert_abs_diff_eq!(grad_w.data[k], numeric, epsilon = TOL);
    }
}

#[test]
fn test_end_to_end_worked_example() {
    let w = Tensor::from_rows(&[vec![2.0], vec![3.0]]).unwrap();
    let b = Tensor::from_rows(&[vec![1.0]]).unwrap();
    let mut layer = Dense::from_parts(w, Some(b), None).unwrap();

    let y = layer.call(Tensor::from_rows(&[vec![1.0, 1.0]]).unwrap()).unwrap();
    assert_eq!(y.read(), &Tensor::from_rows(&[vec![6.0]]).unwrap());

    layer.set_output_error(Tensor::from_rows(&[vec![1.0]]).unwrap()).unwrap();
    let grads = layer.backward().unwrap();
    assert_eq!(grads.weight().unwrap(), &Tensor::from_rows(&[vec![1.0], vec![1.0]]).unwrap());
    assert_eq!(grads.bias().unwrap(), &Tensor::from_rows(&[vec![1.0]]).unwrap());
    assert_eq!(
        layer.input_signal().unwrap().gradient().unwrap(),
        &Tensor::from_rows(&[vec![2.0, 3.0]]).unwrap()
    );
}

#[test]
fn test_identity_layer_passes_gradient_through() {
    let v = Tensor::from_rows(&[vec![0.2, -0.4, 1.1, 3.0]]).unwrap();
    let g = Tensor::from_rows(&[vec![1.0, 0.5, -2.0, 0.0]]).unwrap();
    let mut layer = Dense::from_parts(Tensor::eye(4), None, None).unwrap();

    assert_eq!(layer.call(v.clone()).unwrap().read(), &v);
    layer.set_output_error(g.clone()).unwrap();
    let grads = layer.backward().unwrap();

    let expected_w = v.t().matmul(&g).unwrap();
    for (a, e) in grads.weight().unwrap().data.iter().zip(&expected_w.data) {
        assert_relative_eq!(*a, *e);
    }
    assert_eq!(layer.input_signal().unwrap().gradient().unwrap(), &g);
}

#[test]
fn test_sequence_positions_are_monotonic() {
    let mut chain = Chain::new();
    for _ in 0..5 {
        chain.push(Dense::new(3, 3).unwrap()).unwrap();
    }
    let out = chain.forward(Signal::new(input(), 0)).unwrap();
    assert_eq!(out.sequence_position(), 5);

    for (i, layer) in chain.layers().iter().enumerate() {
        assert_eq!(layer.input_signal().unwrap().sequence_position(), i);
        assert_eq!(layer.output_signal().unwrap().sequence_position(), i + 1);
    }
}

#[test]
fn test_manual_chaining_keeps_positions() {
    let mut first = Dense::new(3, 2).unwrap();
    let mut second = Dense::new(2, 1).unwrap();

    let h = first.call(input()).unwrap().detach();
    let y = second.call(h).unwrap();
    assert_eq!(y.sequence_position(), 2);

    // Raw input always restarts the count
    let y = second.call(Tensor::zeros(vec![1, 2])).unwrap();
    assert_eq!(y.sequence_position(), 1);
}

#[test]
fn test_manual_gradient_hand_off() {
    let mut first = Dense::new(3, 2).unwrap();
    let mut second = Dense::new(2, 1).unwrap();

    let h = first.call(input()).unwrap().detach();
    second.call(h).unwrap();

    second.set_output_error(Tensor::full(vec![3, 1], 1.0)).unwrap();
    second.backward().unwrap();
    let grad_h = second.take_input_error().unwrap();
    assert_eq!(grad_h.shape, vec![3, 2]);

    assert_eq!(
        first.backward(),
        Err(LayerError::GradientNotReady { layer: "dense" })
    );
    first.set_output_error(grad_h).unwrap();
    let grads = first.backward().unwrap();
    assert_eq!(grads.weight().unwrap().shape, vec![3, 2]);
}

#[test]
fn test_single_assignment() {
    let mut signal = Signal::new(Tensor::zeros(vec![2, 2]), 1);
    signal.set_error(Tensor::zeros(vec![2, 2])).unwrap();
    assert_eq!(
        signal.set_error(Tensor::zeros(vec![2, 2])),
        Err(LayerError::AlreadySet { position: 1 })
    );

    let mut layer = Dense::new(2, 2).unwrap();
    layer.call(Tensor::zeros(vec![1, 2])).unwrap();
    assert_eq!(
        layer.backward(),
        Err(LayerError::GradientNotReady { layer: "dense" })
    );
}
