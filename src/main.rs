// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;

use cubegraph::config::{load_and_validate_config, EngineConfig, Options};
use cubegraph::graph::{Network, NetworkBuilder, NodeLayout, NodeRole, Phase};
use cubegraph::init::{Initializer, UniformInit};
use cubegraph::nodes::{InputNodes, TransferNodes};
use cubegraph::samples::{generate_inout, Blobs};
use cubegraph::scheduler::{ErrorSink, TaskManager};
use cubegraph::tensor::{Cube, Vec3i};

/// Small random filter cube.
fn filter<R: rand::Rng>(rng: &mut R, extent: usize) -> Cube<f32> {
    let mut cube = Cube::zeros(Vec3i::splat(extent));
    UniformInit::symmetric(0.1).initialize_cube(rng, &mut cube);
    cube
}

/// input(8³) --fft--> hidden[0] (6³, relu) --filter--> output(4³)
///           --filter-> hidden[1]          --inplace-->
fn build_demo(scheduler: Arc<TaskManager>, rng: &mut StdRng) -> Result<Arc<Network>> {
    let mut builder = NetworkBuilder::new(scheduler);
    let input = builder.add_node(InputNodes::new(
        NodeLayout::new(1, Vec3i::splat(8)).with_priorities(2, 0),
        Options::named("input"),
    )?)?;
    let hidden = builder.add_node(TransferNodes::new(
        NodeLayout::new(2, Vec3i::splat(6)).with_priorities(1, 1),
        Options::named("hidden").with("function", "relu").with("ratio", 0.9),
    )?)?;
    let output = builder.add_node(TransferNodes::new(
        NodeLayout::new(1, Vec3i::splat(4))
            .with_role(NodeRole::Output)
            .with_priorities(0, 2),
        Options::named("output"),
    )?)?;

    builder.connect_fft_filter((input, 0), (hidden, 0), filter(rng, 3))?;
    builder.connect_filter((input, 0), (hidden, 1), filter(rng, 3), Vec3i::splat(1))?;
    builder.connect_filter((hidden, 0), (output, 0), filter(rng, 3), Vec3i::splat(1))?;
    builder.connect_inplace((hidden, 1), (output, 0), filter(rng, 3), Vec3i::splat(1))?;
    Ok(builder.build()?)
}

/// Mean squared error and its gradient against `target`.
fn mse(outputs: &Blobs, target: &Blobs) -> (f32, Blobs) {
    let mut loss = 0.0;
    let mut count = 0usize;
    let mut gradient = Blobs::new();
    for (name, expected) in target {
        let Some(actual) = outputs.get(name) else { continue };
        let cubes = actual
            .iter()
            .zip(expected)
            .map(|(a, e)| {
                let diffs: Vec<f32> = a.data().iter().zip(e.data()).map(|(x, y)| x - y).collect();
                loss += diffs.iter().map(|d| d * d).sum::<f32>();
                count += diffs.len();
                Cube::from_vec(a.size(), diffs).unwrap_or_else(|| Cube::zeros(a.size()))
            })
            .collect();
        gradient.insert(name.clone(), cubes);
    }
    (loss / count.max(1) as f32, gradient)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();
    let config = match args.get(1) {
        Some(path) => load_and_validate_config(path).with_context(|| format!("loading {path}"))?,
        None => EngineConfig::default(),
    };

    let sink = Arc::new(ErrorSink::new());
    let scheduler = Arc::new(TaskManager::build(
        config.scheduler.get_workers(),
        config.scheduler.get_thread_name(),
        Arc::clone(&sink),
    )?);
    let mut rng = StdRng::seed_from_u64(config.seed.unwrap_or(1));

    let net = build_demo(Arc::clone(&scheduler), &mut rng)?;
    net.apply_training(&config.training);

    let (inputs, targets) = generate_inout(config.get_samples(), net.as_ref(), &mut rng);

    println!("Training {} samples on {} workers", inputs.len(), scheduler.worker_count());
    for (i, (input, target)) in inputs.iter().zip(&targets).enumerate() {
        net.begin_pass(&mut rng)?;
        net.run_forward(input)?;
        let (loss, gradient) = mse(&net.outputs(), target);
        net.run_backward(&gradient)?;
        println!(
            "sample {:>3}: loss {:.6}, disabled nodes {}",
            i,
            loss,
            net.disabled_nodes().len()
        );
    }

    net.set_phase(Phase::Test);
    if let Some((input, target)) = inputs.first().zip(targets.first()) {
        net.run_forward(input)?;
        let (loss, _) = mse(&net.outputs(), target);
        println!("test loss {:.6}", loss);
    }

    net.zap()?;
    println!("{}", serde_json::to_string_pretty(&net.serialize())?);

    let by_priority = scheduler.submitted_by_priority();
    println!("Tasks submitted by priority: {:?}", by_priority);
    for err in sink.drain() {
        eprintln!("Unobserved task failure: {err}");
    }
    Ok(())
}
