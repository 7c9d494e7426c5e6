//! One tape stack per thread: independent chains differentiate
//! concurrently with no shared state.

use rayon::prelude::*;
use tapir::{gradient, Scalar, Var};

fn rosenbrock<T: Scalar>(x: &[T]) -> T {
    let one = T::lift(<T::Float as num_traits::FromPrimitive>::from_f64(1.0).unwrap());
    let hundred = T::lift(<T::Float as num_traits::FromPrimitive>::from_f64(100.0).unwrap());
    let dx = one - x[0];
    let t = x[1] - x[0] * x[0];
    dx * dx + hundred * t * t
}

#[test]
fn concurrent_chains_match_serial() {
    let points: Vec<[f64; 2]> = (0..32)
        .map(|i| [0.5 + 0.1 * i as f64, 1.0 - 0.05 * i as f64])
        .collect();

    let serial: Vec<Vec<f64>> = points
        .iter()
        .map(|x| gradient(|v: &[Var<f64>]| rosenbrock(v), x).1)
        .collect();

    let parallel: Vec<Vec<f64>> = points
        .par_iter()
        .map(|x| gradient(|v: &[Var<f64>]| rosenbrock(v), x).1)
        .collect();

    for (s, p) in serial.iter().zip(parallel.iter()) {
        for (a, b) in s.iter().zip(p.iter()) {
            assert_eq!(a.to_bits(), b.to_bits(), "serial={a}, parallel={b}");
        }
    }
}

#[test]
fn nested_scopes_stay_thread_local() {
    use tapir::{StackGuard, TapeStack};

    let results: Vec<f64> = (0..8)
        .into_par_iter()
        .map(|i| {
            let mut stack = TapeStack::<f64>::new();
            let _guard = StackGuard::new(&mut stack);

            let x = Var::new(1.0 + i as f64);
            let y = x * x;

            stack.start_nested();
            let _ = x.exp() * x.sin();
            stack.recover_nested().unwrap();

            stack.sweep(y.id());
            stack.adjoint(x.id())
        })
        .collect();

    for (i, g) in results.iter().enumerate() {
        assert_eq!(*g, 2.0 * (1.0 + i as f64));
    }
}
