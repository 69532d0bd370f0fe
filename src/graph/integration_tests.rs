// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{Options, TrainingConfig};
use crate::errors::{Capability, GraphError, NodeError, OptionsError, TaskError};
use crate::graph::{stochastic_gate, EdgeId, Network, NetworkBuilder, NodeCore, NodeId, NodeLayout, NodeRole, Phase};
use crate::init::{Initializer, UniformInit};
use crate::nodes::{InputNodes, TransferNodes};
use crate::samples::{generate_inout, Blobs};
use crate::scheduler::{ErrorSink, TaskManager};
use crate::tensor::ops::convolve_sparse_valid;
use crate::tensor::{Cube, Vec3i};
use crate::traits::{Edge, Node};

fn scheduler(workers: usize) -> Arc<TaskManager> {
    Arc::new(TaskManager::new(workers).unwrap())
}

fn input(name: &str, size: usize, extent: Vec3i) -> InputNodes {
    InputNodes::new(NodeLayout::new(size, extent), Options::named(name)).unwrap()
}

fn hidden(name: &str, size: usize, extent: Vec3i) -> TransferNodes {
    TransferNodes::new(NodeLayout::new(size, extent), Options::named(name)).unwrap()
}

fn output(name: &str, size: usize, extent: Vec3i) -> TransferNodes {
    TransferNodes::new(
        NodeLayout::new(size, extent).with_role(NodeRole::Output),
        Options::named(name),
    )
    .unwrap()
}

fn random_cube(rng: &mut StdRng, extent: Vec3i) -> Cube<f32> {
    let mut cube = Cube::zeros(extent);
    UniformInit::symmetric(1.0).initialize_cube(rng, &mut cube);
    cube
}

fn blobs(name: &str, cubes: Vec<Cube<f32>>) -> Blobs {
    [(name.to_string(), cubes)].into()
}

fn assert_close(a: &[Cube<f32>], b: &[Cube<f32>]) {
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(b) {
        assert_eq!(x.size(), y.size());
        for (p, q) in x.data().iter().zip(y.data()) {
            assert!((p - q).abs() < 1e-3, "{p} != {q}");
        }
    }
}

fn flags(net: &Network) -> Vec<Vec<bool>> {
    net.nodes().map(|n| n.core().enabled_flags()).collect()
}

fn assert_never_reenabled(before: &[Vec<bool>], after: &[Vec<bool>]) {
    for (b, a) in before.iter().zip(after) {
        for (was, now) in b.iter().zip(a) {
            assert!(*was || !*now, "a disabled slot came back on");
        }
    }
}

const CUBE: Vec3i = Vec3i::splat(2);

/// in -> h1, h2 -> out, identity edges.
fn diamond(scheduler: Arc<TaskManager>) -> (Arc<Network>, [NodeId; 4]) {
    let mut b = NetworkBuilder::new(scheduler);
    let i = b.add_node(input("in", 1, CUBE)).unwrap();
    let h1 = b.add_node(hidden("h1", 1, CUBE)).unwrap();
    let h2 = b.add_node(hidden("h2", 1, CUBE)).unwrap();
    let o = b.add_node(output("out", 1, CUBE)).unwrap();
    b.connect_dummy((i, 0), (h1, 0)).unwrap();
    b.connect_dummy((i, 0), (h2, 0)).unwrap();
    b.connect_dummy((h1, 0), (o, 0)).unwrap();
    b.connect_dummy((h2, 0), (o, 0)).unwrap();
    (b.build().unwrap(), [i, h1, h2, o])
}

/// in -> h -> out where `h` carries the given dropout ratio.
fn gated(ratio: Option<f64>) -> (Arc<Network>, NodeId) {
    let mut options = Options::named("h");
    if let Some(ratio) = ratio {
        options.insert("ratio", ratio);
    }
    let mut b = NetworkBuilder::new(scheduler(2));
    let i = b.add_node(input("in", 1, CUBE)).unwrap();
    let h = b
        .add_node(TransferNodes::new(NodeLayout::new(1, CUBE), options).unwrap())
        .unwrap();
    let o = b.add_node(output("out", 1, CUBE)).unwrap();
    b.connect_dummy((i, 0), (h, 0)).unwrap();
    b.connect_dummy((h, 0), (o, 0)).unwrap();
    (b.build().unwrap(), h)
}

/// Output-role node with no pass capability at all.
#[derive(Debug)]
struct Terminal {
    core: NodeCore,
}

impl Terminal {
    fn new(name: &str) -> Self {
        let layout = NodeLayout::new(1, CUBE).with_role(NodeRole::Output);
        Self {
            core: NodeCore::new(layout, Options::named(name)).unwrap(),
        }
    }
}

impl Node for Terminal {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn attach_in_edge(&mut self, slot: usize, edge: EdgeId) -> Result<(), NodeError> {
        self.core.attach_in(slot, edge)
    }

    fn zap(&self) {}

    fn serialize(&self) -> Options {
        self.core.options().clone()
    }
}

// ---- enable / disable ----

#[test]
fn test_disable_cascades_and_never_enables() {
    let (net, [i, h1, h2, o]) = diamond(scheduler(1));
    assert!(net.disabled_nodes().is_empty());
    assert_eq!(net.node(i).core().out_enabled(0), 2);

    let before = flags(&net);
    net.enable_node(h1, false);
    let middle = flags(&net);
    assert_never_reenabled(&before, &middle);
    assert_eq!(net.disabled_nodes(), vec![h1]);
    assert_eq!(net.node(i).core().out_enabled(0), 1);
    assert_eq!(net.node(o).core().in_enabled(0), 1);

    net.enable_node(h2, false);
    let after = flags(&net);
    assert_never_reenabled(&middle, &after);
    assert_eq!(net.disabled_nodes(), vec![i, h1, h2, o]);
    assert!(net.edges().all(|e| !e.core().is_enabled()));
}

#[test]
fn test_enable_slot_reconnects_enabled_neighbours() {
    let mut b = NetworkBuilder::new(scheduler(1));
    let i = b.add_node(input("in", 1, CUBE)).unwrap();
    let h = b.add_node(hidden("h", 2, CUBE)).unwrap();
    let o = b.add_node(output("out", 1, CUBE)).unwrap();
    for slot in 0..2 {
        b.connect_dummy((i, 0), (h, slot)).unwrap();
        b.connect_dummy((h, slot), (o, 0)).unwrap();
    }
    let net = b.build().unwrap();

    net.enable_slot(h, 1, false).unwrap();
    assert_eq!(net.node(h).core().enabled_flags(), vec![true, false]);
    assert!(!net.node(h).is_disabled());
    assert_eq!(net.node(i).core().out_enabled(0), 1);
    assert_eq!(net.node(o).core().in_enabled(0), 1);

    net.enable_slot(h, 1, true).unwrap();
    assert_eq!(net.node(h).core().enabled_flags(), vec![true, true]);
    assert_eq!(net.node(i).core().out_enabled(0), 2);
    assert_eq!(net.node(o).core().in_enabled(0), 2);
    assert!(net.edges().all(|e| e.core().is_enabled()));

    assert!(matches!(
        net.enable_slot(h, 2, true),
        Err(NodeError::SlotOutOfRange { slot: 2, .. })
    ));
}

#[test]
fn test_enable_without_live_neighbours_settles_off_until_reset() {
    let (net, [_, h1, h2, o]) = diamond(scheduler(1));
    net.node(h1).enable(&net, false);
    net.node(h2).enable(&net, false);
    assert_eq!(net.disabled_nodes().len(), 4);

    net.enable_node(h1, true);
    assert!(net.node(h1).is_disabled());

    net.reset_enabled();
    assert!(net.disabled_nodes().is_empty());
    assert_eq!(net.node(o).core().in_enabled(0), 2);
    assert!(net.edges().all(|e| e.core().is_enabled()));
}

#[test]
fn test_disabled_node_submits_nothing() {
    let sched = scheduler(2);
    let (net, [i, h1, h2, _]) = diamond(Arc::clone(&sched));
    let mut rng = StdRng::seed_from_u64(1);
    let x = random_cube(&mut rng, CUBE);

    net.enable_node(h2, false);
    assert!(net.forward(i, 0, vec![x.clone()]).unwrap());
    net.wait().unwrap();
    assert_eq!(net.node(h2).core().dispatched(), 0);
    assert_eq!(net.node(i).core().dispatched(), 1);
    assert_eq!(net.node(h1).core().dispatched(), 1);
    assert_eq!(sched.submitted(), 2);
    assert_close(&net.outputs()["out"], &[x.clone()]);

    net.enable_node(h1, false);
    assert!(net.node(i).is_disabled());
    assert!(!net.forward(i, 0, vec![x]).unwrap());
    net.wait().unwrap();
    assert_eq!(sched.submitted(), 2);
}

// ---- joins and priorities ----

#[test]
fn test_join_fires_once_under_concurrent_delivery() {
    let sched = scheduler(4);
    let mut b = NetworkBuilder::new(Arc::clone(&sched));
    let a = b.add_node(input("a", 1, CUBE)).unwrap();
    let c = b.add_node(input("c", 1, CUBE)).unwrap();
    let j = b
        .add_node(
            TransferNodes::new(
                NodeLayout::new(1, CUBE).with_priorities(5, 0),
                Options::named("join"),
            )
            .unwrap(),
        )
        .unwrap();
    let o = b.add_node(output("out", 1, CUBE)).unwrap();
    b.connect_dummy((a, 0), (j, 0)).unwrap();
    b.connect_dummy((c, 0), (j, 0)).unwrap();
    b.connect_dummy((j, 0), (o, 0)).unwrap();
    let net = b.build().unwrap();

    const ROUNDS: u64 = 25;
    for round in 1..=ROUNDS {
        let drivers: Vec<_> = [(a, 1.0f32), (c, 2.0)]
            .into_iter()
            .map(|(id, value)| {
                let net = Arc::clone(&net);
                thread::spawn(move || {
                    let delay = rand::thread_rng().gen_range(0..500);
                    thread::sleep(Duration::from_micros(delay));
                    net.forward(id, 0, vec![Cube::filled(CUBE, value)]).unwrap()
                })
            })
            .collect();
        for driver in drivers {
            assert!(driver.join().unwrap());
        }
        net.wait().unwrap();

        assert_eq!(sched.submitted_by_priority().get(&5), Some(&round));
        assert_eq!(net.node(j).core().dispatched(), round);
        assert!(net.outputs()["out"][0].data().iter().all(|&v| v == 3.0));
    }
    assert_eq!(sched.submitted_by_priority().get(&0), Some(&(2 * ROUNDS)));
}

#[test]
fn test_fft_and_real_deliveries_share_one_join() {
    let mut rng = StdRng::seed_from_u64(4);
    let filter = random_cube(&mut rng, Vec3i::splat(3));
    let x = random_cube(&mut rng, Vec3i::splat(5));

    let mut b = NetworkBuilder::new(scheduler(3));
    let i = b.add_node(input("in", 1, Vec3i::splat(5))).unwrap();
    let o = b.add_node(output("out", 1, Vec3i::splat(3))).unwrap();
    b.connect_filter((i, 0), (o, 0), filter.clone(), Vec3i::splat(1)).unwrap();
    b.connect_fft_filter((i, 0), (o, 0), filter.clone()).unwrap();
    let net = b.build().unwrap();
    assert_eq!(net.node(o).core().in_enabled(0), 2);

    net.run_forward(&blobs("in", vec![x.clone()])).unwrap();
    let spatial = convolve_sparse_valid(&x, &filter, Vec3i::splat(1));
    assert_close(&net.outputs()["out"], &[spatial.map(|v| 2.0 * v)]);
    assert_eq!(net.node(i).core().dispatched(), 2);
}

// ---- phases ----

#[test]
fn test_test_and_optimize_never_disable() {
    let (net, h) = gated(Some(1e-9));
    let mut rng = StdRng::seed_from_u64(3);
    for phase in [Phase::Test, Phase::Optimize] {
        net.set_phase(phase);
        for _ in 0..20 {
            net.setup(&mut rng).unwrap();
            net.begin_pass(&mut rng).unwrap();
            assert!(net.disabled_nodes().is_empty());
            assert_eq!(stochastic_gate(&net, h, &mut rng).unwrap(), None);
        }
    }
    assert_eq!(net.phase(), Phase::Optimize);
    assert_eq!(net.node(h).core().phase(), Phase::Optimize);
}

#[test]
fn test_ratio_one_always_keeps() {
    let (net, h) = gated(Some(1.0));
    let mut rng = StdRng::seed_from_u64(5);
    for _ in 0..50 {
        net.begin_pass(&mut rng).unwrap();
        assert!(net.disabled_nodes().is_empty());
        assert_eq!(stochastic_gate(&net, h, &mut rng).unwrap(), Some(true));
    }
}

#[test]
fn test_missing_ratio_leaves_flags_alone() {
    let (net, h) = gated(None);
    let mut rng = StdRng::seed_from_u64(6);
    net.enable_slot(h, 0, false).unwrap();
    let before = flags(&net);
    net.setup(&mut rng).unwrap();
    assert_eq!(flags(&net), before);
    assert_eq!(stochastic_gate(&net, h, &mut rng).unwrap(), None);
}

#[test]
fn test_dropout_persists_until_reset() {
    let (net, h) = gated(Some(1e-9));
    let mut rng = StdRng::seed_from_u64(7);

    net.begin_pass(&mut rng).unwrap();
    assert!(net.node(h).is_disabled());
    assert_eq!(net.disabled_nodes().len(), 3);

    net.set_phase(Phase::Test);
    assert!(net.disabled_nodes().is_empty());
    net.begin_pass(&mut rng).unwrap();
    assert!(net.disabled_nodes().is_empty());

    net.set_phase(Phase::Train);
    assert!(net.disabled_nodes().is_empty());
    net.begin_pass(&mut rng).unwrap();
    assert!(net.node(h).is_disabled());
}

#[test]
fn test_dropout_rate_follows_ratio() {
    let (net, h) = gated(Some(0.5));
    let mut rng = StdRng::seed_from_u64(8);
    let kept = (0..400)
        .filter(|_| {
            net.begin_pass(&mut rng).unwrap();
            !net.node(h).is_disabled()
        })
        .count();
    assert!((120..=280).contains(&kept), "kept {kept} of 400");
}

#[test]
fn test_ratio_out_of_range_is_rejected() {
    let (net, _) = gated(Some(1.5));
    let err = net.setup(&mut StdRng::seed_from_u64(9)).unwrap_err();
    assert!(matches!(err, NodeError::Options(OptionsError::OutOfRange { .. })));
}

// ---- spectral and legacy paths ----

/// Forward, backward and a second forward through a single filter edge.
fn train_once(connect: impl FnOnce(&mut NetworkBuilder, NodeId, NodeId), src: Vec3i, dst: Vec3i, seed: u64) -> [Vec<Cube<f32>>; 3] {
    let mut rng = StdRng::seed_from_u64(seed);
    let x = random_cube(&mut rng, src);
    let g = random_cube(&mut rng, dst);

    let mut b = NetworkBuilder::new(scheduler(2));
    let i = b.add_node(input("in", 1, src)).unwrap();
    let o = b.add_node(output("out", 1, dst)).unwrap();
    connect(&mut b, i, o);
    let net = b.build().unwrap();
    net.set_eta(0.1);

    let sample = blobs("in", vec![x]);
    net.run_forward(&sample).unwrap();
    let first = net.outputs()["out"].clone();
    net.run_backward(&blobs("out", vec![g])).unwrap();
    let input_gradient = net.input_gradients()["in"].clone();
    net.run_forward(&sample).unwrap();
    let second = net.outputs()["out"].clone();
    [first, input_gradient, second]
}

#[test]
fn test_fft_and_spatial_filters_agree() {
    let (src, dst, k) = (Vec3i::new(6, 5, 4), Vec3i::new(4, 4, 3), Vec3i::new(3, 2, 2));
    let filter = random_cube(&mut StdRng::seed_from_u64(10), k);

    let f = filter.clone();
    let spatial = train_once(
        move |b, i, o| {
            b.connect_filter((i, 0), (o, 0), f, Vec3i::splat(1)).unwrap();
        },
        src,
        dst,
        11,
    );
    let spectral = train_once(
        move |b, i, o| {
            b.connect_fft_filter((i, 0), (o, 0), filter).unwrap();
        },
        src,
        dst,
        11,
    );

    for (a, b) in spatial.iter().zip(&spectral) {
        assert_close(a, b);
    }
    assert_ne!(spatial[0][0].data(), spatial[2][0].data());
}

#[test]
fn test_inplace_matches_sparse_filter() {
    let (src, dst, k, sparse) = (Vec3i::splat(7), Vec3i::splat(5), Vec3i::splat(2), Vec3i::splat(2));
    let filter = random_cube(&mut StdRng::seed_from_u64(12), k);

    let f = filter.clone();
    let edge = train_once(
        move |b, i, o| {
            b.connect_filter((i, 0), (o, 0), f, sparse).unwrap();
        },
        src,
        dst,
        13,
    );
    let inplace = train_once(
        move |b, i, o| {
            b.connect_inplace((i, 0), (o, 0), filter, sparse).unwrap();
        },
        src,
        dst,
        13,
    );

    for (a, b) in edge.iter().zip(&inplace) {
        assert_close(a, b);
    }
}

#[test]
fn test_zero_learning_rate_freezes_weights() {
    let filter = random_cube(&mut StdRng::seed_from_u64(14), Vec3i::splat(2));
    let [first, _, second] = train_once(
        move |b, i, o| {
            b.connect_filter((i, 0), (o, 0), filter, Vec3i::splat(1)).unwrap();
        },
        Vec3i::splat(3),
        Vec3i::splat(2),
        15,
    );
    assert_ne!(first[0].data(), second[0].data());

    let mut b = NetworkBuilder::new(scheduler(1));
    let i = b.add_node(input("in", 1, Vec3i::splat(3))).unwrap();
    let o = b.add_node(output("out", 1, Vec3i::splat(2))).unwrap();
    b.connect_filter((i, 0), (o, 0), Cube::filled(Vec3i::splat(2), 0.5), Vec3i::splat(1))
        .unwrap();
    let net = b.build().unwrap();
    net.apply_training(&TrainingConfig {
        eta: Some(0.0),
        momentum: None,
        weight_decay: None,
    });
    let sample = blobs("in", vec![Cube::filled(Vec3i::splat(3), 1.0)]);
    net.run_forward(&sample).unwrap();
    let before = net.outputs();
    net.run_backward(&blobs("out", vec![Cube::filled(Vec3i::splat(2), 1.0)])).unwrap();
    net.run_forward(&sample).unwrap();
    assert_eq!(net.outputs(), before);
}

// ---- failures ----

#[test]
fn test_unsupported_pass_fails_the_waiter() {
    let sink = Arc::new(ErrorSink::new());
    let sched = Arc::new(TaskManager::with_sink(2, Arc::clone(&sink)).unwrap());
    let mut b = NetworkBuilder::new(sched);
    let i = b.add_node(input("in", 1, CUBE)).unwrap();
    let t1 = b.add_node(Terminal::new("t1")).unwrap();
    let t2 = b.add_node(Terminal::new("t2")).unwrap();
    b.connect_dummy((i, 0), (t1, 0)).unwrap();
    b.connect_dummy((i, 0), (t2, 0)).unwrap();
    let net = b.build().unwrap();

    assert!(net.forward(i, 0, vec![Cube::zeros(CUBE)]).unwrap());
    let err = net.wait().unwrap_err();
    assert!(matches!(err, NodeError::Task(TaskError::Failed { .. })));
    assert!(err.to_string().contains("does not support"));
    assert_eq!(sink.len(), 1);
    assert!(!net.node(i).core().has_pending());

    assert!(matches!(
        net.require_real(t1),
        Err(NodeError::Unsupported {
            capability: Capability::RealPass,
            ..
        })
    ));
    assert!(net.require_featuremaps(t2).is_err());
    assert!(net.node(t1).num_in_nodes().is_err());
    assert!(net.outputs().is_empty());
}

#[test]
fn test_sample_feeding_validates_names_and_counts() {
    let (net, _) = diamond(scheduler(1));
    assert!(matches!(
        net.forward_sample(&blobs("nope", vec![])),
        Err(GraphError::UnknownName(name)) if name == "nope"
    ));
    assert!(matches!(
        net.forward_sample(&blobs("in", vec![])),
        Err(GraphError::Node(NodeError::BatchMismatch {
            expected: 1,
            actual: 0,
            ..
        }))
    ));
    assert!(matches!(
        net.forward(NodeId(0), 0, vec![Cube::zeros(Vec3i::splat(3))]),
        Err(NodeError::ShapeMismatch { .. })
    ));
}

/// a, c -> j (output), identity edges; `terminal` adds a failing a -> t.
fn two_inputs(terminal: bool) -> Arc<Network> {
    let mut b = NetworkBuilder::new(scheduler(2));
    let a = b.add_node(input("a", 1, CUBE)).unwrap();
    let c = b.add_node(input("c", 1, CUBE)).unwrap();
    let j = b.add_node(output("j", 1, CUBE)).unwrap();
    b.connect_dummy((a, 0), (j, 0)).unwrap();
    b.connect_dummy((c, 0), (j, 0)).unwrap();
    if terminal {
        let t = b.add_node(Terminal::new("t")).unwrap();
        b.connect_dummy((a, 0), (t, 0)).unwrap();
    }
    b.build().unwrap()
}

fn pair(a: f32, c: f32) -> Blobs {
    [
        ("a".to_string(), vec![Cube::filled(CUBE, a)]),
        ("c".to_string(), vec![Cube::filled(CUBE, c)]),
    ]
    .into()
}

#[test]
fn test_rejected_sample_submits_nothing() {
    let net = two_inputs(false);
    let mut bad = blobs("a", vec![Cube::filled(CUBE, 100.0)]);
    bad.insert("zz_unknown".to_string(), vec![]);
    assert!(matches!(net.run_forward(&bad), Err(GraphError::UnknownName(_))));

    let mut misshapen = blobs("a", vec![Cube::filled(CUBE, 100.0)]);
    misshapen.insert("c".to_string(), vec![Cube::zeros(Vec3i::splat(3))]);
    assert!(matches!(
        net.run_forward(&misshapen),
        Err(GraphError::Node(NodeError::ShapeMismatch { .. }))
    ));
    assert_eq!(net.scheduler().submitted(), 0);

    let mut rng = StdRng::seed_from_u64(1);
    for _ in 0..3 {
        net.begin_pass(&mut rng).unwrap();
        net.run_forward(&pair(1.0, 2.0)).unwrap();
        assert!(net.outputs()["j"][0].data().iter().all(|&v| v == 3.0));
    }
}

#[test]
fn test_failed_pass_drops_partial_sums() {
    let net = two_inputs(true);
    // Only `a` is fed: j holds a partial sum when t's task fails.
    assert!(net.run_forward(&blobs("a", vec![Cube::filled(CUBE, 100.0)])).is_err());

    for _ in 0..3 {
        assert!(net.run_forward(&pair(1.0, 2.0)).is_err());
        assert!(net.outputs()["j"][0].data().iter().all(|&v| v == 3.0));
    }
}

#[test]
fn test_extra_failures_keep_their_priority() {
    let sink = Arc::new(ErrorSink::new());
    let sched = Arc::new(TaskManager::with_sink(2, Arc::clone(&sink)).unwrap());
    let mut b = NetworkBuilder::new(sched);
    let i = b
        .add_node(
            InputNodes::new(
                NodeLayout::new(1, CUBE).with_priorities(7, 3),
                Options::named("in"),
            )
            .unwrap(),
        )
        .unwrap();
    for name in ["t1", "t2", "t3"] {
        let t = b.add_node(Terminal::new(name)).unwrap();
        b.connect_dummy((i, 0), (t, 0)).unwrap();
    }
    let net = b.build().unwrap();

    assert!(net.forward(i, 0, vec![Cube::zeros(CUBE)]).unwrap());
    assert!(net.wait().is_err());
    assert_eq!(sink.priorities(), vec![7, 7]);
}

#[test]
fn test_backward_before_forward_is_reported() {
    let mut b = NetworkBuilder::new(scheduler(1));
    let i = b.add_node(input("in", 1, Vec3i::splat(4))).unwrap();
    let o = b.add_node(output("out", 1, CUBE)).unwrap();
    let e = b
        .connect_filter((i, 0), (o, 0), Cube::filled(Vec3i::splat(3), 1.0), Vec3i::splat(1))
        .unwrap();
    let net = b.build().unwrap();

    match net.edge(e).backward(&net, vec![Cube::zeros(CUBE)]) {
        Err(NodeError::MissingForward(label)) => assert!(label.contains(&e.to_string())),
        other => panic!("expected a missing forward, got {other:?}"),
    }

    let err = net.run_backward(&blobs("out", vec![Cube::zeros(CUBE)])).unwrap_err();
    assert!(err.to_string().contains("without a preceding forward pass"));
}

// ---- builder ----

#[test]
fn test_builder_rejects_bad_wiring() {
    let mut b = NetworkBuilder::new(scheduler(1));
    let i = b.add_node(input("in", 1, Vec3i::splat(4))).unwrap();
    let h = b.add_node(hidden("h", 1, Vec3i::splat(4))).unwrap();
    let small = b.add_node(hidden("small", 1, CUBE)).unwrap();
    let batched = b
        .add_node(
            TransferNodes::new(
                NodeLayout::new(1, Vec3i::splat(4)).with_batch_size(2),
                Options::named("batched"),
            )
            .unwrap(),
        )
        .unwrap();

    assert!(matches!(b.add_node(hidden("h", 1, CUBE)), Err(GraphError::DuplicateName(n)) if n == "h"));
    assert!(matches!(
        b.connect_dummy((h, 0), (h, 0)),
        Err(GraphError::IncompatibleEndpoints { .. })
    ));
    assert!(matches!(
        b.connect_dummy((i, 0), (small, 0)),
        Err(GraphError::IncompatibleEndpoints { .. })
    ));
    assert!(matches!(
        b.connect_dummy((i, 0), (batched, 0)),
        Err(GraphError::IncompatibleEndpoints { .. })
    ));
    assert!(matches!(
        b.connect_filter((i, 0), (small, 0), Cube::zeros(CUBE), Vec3i::splat(1)),
        Err(GraphError::IncompatibleEndpoints { .. })
    ));
    assert!(matches!(
        b.connect_dummy((i, 1), (h, 0)),
        Err(GraphError::Node(NodeError::SlotOutOfRange { .. }))
    ));
    assert!(matches!(
        b.connect_dummy((NodeId(99), 0), (h, 0)),
        Err(GraphError::UnknownNode(_))
    ));
    assert!(matches!(
        b.connect_filter((i, 0), (h, 0), Cube::zeros(Vec3i::new(0, 1, 1)), Vec3i::splat(1)),
        Err(GraphError::IncompatibleEndpoints { .. })
    ));
    assert!(matches!(
        b.connect_inplace((i, 0), (h, 0), Cube::zeros(Vec3i::new(1, 0, 1)), Vec3i::splat(1)),
        Err(GraphError::IncompatibleEndpoints { .. })
    ));
    assert!(matches!(
        b.connect_fft_filter((i, 0), (h, 0), Cube::zeros(Vec3i::new(1, 1, 0))),
        Err(GraphError::IncompatibleEndpoints { .. })
    ));
    assert!(matches!(
        b.connect_filter((i, 0), (small, 0), Cube::zeros(Vec3i::splat(3)), Vec3i::new(1, 0, 1)),
        Err(GraphError::IncompatibleEndpoints { .. })
    ));
    assert!(b
        .connect_filter((i, 0), (small, 0), Cube::zeros(Vec3i::splat(3)), Vec3i::splat(1))
        .is_ok());
}

#[test]
fn test_builder_detects_cycles() {
    let mut b = NetworkBuilder::new(scheduler(1));
    let i = b.add_node(input("in", 1, CUBE)).unwrap();
    let x = b.add_node(hidden("x", 1, CUBE)).unwrap();
    let y = b.add_node(hidden("y", 1, CUBE)).unwrap();
    b.connect_dummy((i, 0), (x, 0)).unwrap();
    b.connect_dummy((x, 0), (y, 0)).unwrap();
    b.connect_dummy((y, 0), (x, 0)).unwrap();
    match b.build() {
        Err(GraphError::Cycle(names)) => assert_eq!(names, vec!["x".to_string(), "y".to_string()]),
        other => panic!("expected a cycle, got {other:?}"),
    }
}

#[test]
fn test_half_attached_builder_is_unusable() {
    let mut b = NetworkBuilder::new(scheduler(1));
    let i = b.add_node(input("in", 1, CUBE)).unwrap();
    let h = b.add_node(hidden("h", 1, CUBE)).unwrap();
    assert!(matches!(
        b.connect_dummy((h, 0), (i, 0)),
        Err(GraphError::PartialAttach(_))
    ));
    assert!(matches!(b.build(), Err(GraphError::PartialAttach(_))));
}

#[test]
fn test_topological_order_and_layout() {
    let (net, [i, h1, h2, o]) = diamond(scheduler(1));
    let order = net.topological_order();
    let pos = |id: NodeId| order.iter().position(|&n| n == id).unwrap();
    assert!(pos(i) < pos(h1) && pos(i) < pos(h2));
    assert!(pos(h1) < pos(o) && pos(h2) < pos(o));
    assert_eq!(net.find("h2"), Some(h2));
    assert_eq!((net.node_count(), net.edge_count()), (4, 4));

    let (ins, outs) = generate_inout(2, net.as_ref(), &mut StdRng::seed_from_u64(1));
    assert_eq!(ins.len(), 2);
    assert_eq!(ins[0]["in"].len(), 1);
    assert_eq!(outs[1]["out"][0].size(), CUBE);
}

// ---- whole passes ----

#[test]
fn test_diamond_forward_and_backward_sums() {
    let (net, _) = diamond(scheduler(3));
    let x = Cube::filled(CUBE, 1.5);
    let g = Cube::filled(CUBE, 0.25);

    net.run_forward(&blobs("in", vec![x])).unwrap();
    assert_close(&net.outputs()["out"], &[Cube::filled(CUBE, 3.0)]);

    net.run_backward(&blobs("out", vec![g])).unwrap();
    assert_close(&net.input_gradients()["in"], &[Cube::filled(CUBE, 0.5)]);
}

#[test]
fn test_batched_slots_are_fed_slot_major() {
    let mut b = NetworkBuilder::new(scheduler(2));
    let layout = NodeLayout::new(2, CUBE).with_batch_size(2);
    let i = b
        .add_node(InputNodes::new(layout, Options::named("in")).unwrap())
        .unwrap();
    let o = b
        .add_node(
            TransferNodes::new(layout.with_role(NodeRole::Output), Options::named("out")).unwrap(),
        )
        .unwrap();
    b.connect_dummy((i, 0), (o, 0)).unwrap();
    b.connect_dummy((i, 1), (o, 1)).unwrap();
    let net = b.build().unwrap();

    let cubes: Vec<Cube<f32>> = (0..4).map(|v| Cube::filled(CUBE, v as f32)).collect();
    assert_eq!(net.forward_sample(&blobs("in", cubes.clone())).unwrap(), 2);
    net.wait().unwrap();
    assert_close(&net.outputs()["out"], &cubes);
}

#[test]
fn test_zap_and_serialize() {
    let (net, _) = diamond(scheduler(2));
    net.run_forward(&blobs("in", vec![Cube::filled(CUBE, 1.0)])).unwrap();
    net.zap().unwrap();
    assert_close(&net.outputs()["out"], &[Cube::zeros(CUBE)]);

    let snapshot = net.serialize();
    let names: Vec<String> = snapshot.iter().map(|o| o.name().unwrap()).collect();
    assert_eq!(names, vec!["in", "h1", "h2", "out"]);
    assert_eq!(snapshot[0].require_as::<String>("type").unwrap(), "input");
    assert!(snapshot[1].contains("biases"));
}
