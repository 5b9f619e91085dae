//! Demonstrates scope-bound arrays in a request-processing loop.
//!
//! Each request is a unit of work with its own scope. Arrays created for the request are
//! released when the scope ends, whether the request succeeds or fails, and a checkpoint lets a
//! request discard speculative work without giving up what it built before.

use scoped_array::{Array, Error, Scope, ScopeAllocator, define_array_type};

define_array_type! {
    /// Latencies observed while handling one request, in microseconds.
    struct Latencies(u32);
}

fn main() {
    println!("=== Scope-bound arrays ===");
    println!();

    let requests: [&[u32]; 3] = [&[120, 85, 340, 95], &[15; 40], &[]];

    for (index, samples) in requests.iter().enumerate() {
        let scope = Scope::builder().name("request").chain_capacity(8).build();

        match handle_request(&scope, index, samples) {
            Ok(summary) => println!("{summary}"),
            Err(error) => println!("request {index} failed: {error}"),
        }

        // Everything registered with the scope is released here.
        drop(scope);
    }

    println!();
    println!("=== Checkpoints ===");
    println!();

    let mut scope = Scope::new();

    let kept = Array::<u64>::new_in(&scope).expect("a fresh scope has room for one array");
    kept.append(1).expect("the first append only needs a small block");

    let checkpoint = scope.generation();

    let speculative = Array::<u64>::new_in(&scope).expect("the scope has no allocation limit");
    for value in 0..100 {
        speculative
            .append(value)
            .expect("growing to 112 elements needs less than a kilobyte");
    }

    println!("pending releases before rollback: {}", scope.pending_releases());
    scope.rollback_to(checkpoint);
    println!("pending releases after rollback:  {}", scope.pending_releases());
}

fn handle_request(scope: &Scope, index: usize, samples: &[u32]) -> Result<String, Error> {
    let latencies = Latencies::new_in(scope)?;

    for sample in samples {
        latencies.append(*sample)?;
    }

    latencies.sort_by(Ord::cmp);

    let label = scope.format(format_args!("request {index}"))?;

    let Some(slowest) = latencies.as_slice().last() else {
        return Ok(format!("{label}: no samples"));
    };

    Ok(format!(
        "{label}: {} samples, slowest {slowest} us",
        latencies.len()
    ))
}
