// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

#[cfg(test)]
mod integration_tests {
    use std::io::Write;
    use std::sync::Arc;

    use crate::config::{load_and_validate_config, Options};
    use crate::graph::{NetworkBuilder, NodeLayout, NodeRole};
    use crate::nodes::{InputNodes, TransferNodes};
    use crate::scheduler::{ErrorSink, TaskManager};
    use crate::tensor::{Cube, Vec3i};

    /// The shipped demo configuration parses and validates.
    #[test]
    fn test_demo_yaml_loading() {
        let config = load_and_validate_config("configs/demo.yaml").unwrap();

        assert_eq!(config.scheduler.get_workers(), 4);
        assert_eq!(config.scheduler.get_thread_name(), "cubegraph-worker");
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.training.get_momentum(), 0.9);
        assert_eq!(config.get_samples(), 8);
    }

    /// A scheduler and a network built from a config file run a pass.
    #[test]
    fn test_build_network_from_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "scheduler:\n  workers: 2\n  thread_name: cfg-pool\ntraining:\n  eta: 0.5").unwrap();
        let config = load_and_validate_config(file.path()).unwrap();

        let sink = Arc::new(ErrorSink::new());
        let scheduler = Arc::new(
            TaskManager::build(
                config.scheduler.get_workers(),
                config.scheduler.get_thread_name(),
                Arc::clone(&sink),
            )
            .unwrap(),
        );
        assert_eq!(scheduler.worker_count(), 2);

        let extent = Vec3i::splat(3);
        let mut builder = NetworkBuilder::new(Arc::clone(&scheduler));
        let i = builder
            .add_node(InputNodes::new(NodeLayout::new(1, extent), Options::named("in")).unwrap())
            .unwrap();
        let o = builder
            .add_node(
                TransferNodes::new(
                    NodeLayout::new(1, extent).with_role(NodeRole::Output),
                    Options::named("out").with("bias", 1.0),
                )
                .unwrap(),
            )
            .unwrap();
        builder.connect_dummy((i, 0), (o, 0)).unwrap();
        let net = builder.build().unwrap();
        net.apply_training(&config.training);

        let sample = [("in".to_string(), vec![Cube::filled(extent, 2.0)])].into();
        net.run_forward(&sample).unwrap();
        assert!(net.outputs()["out"][0].data().iter().all(|&v| v == 3.0));

        // One unit of gradient per voxel moves the bias by eta * 27.
        let gradient = [("out".to_string(), vec![Cube::filled(extent, 1.0)])].into();
        net.run_backward(&gradient).unwrap();
        let biases: Vec<f32> = net.serialize()[1].require_as("biases").unwrap();
        assert!((biases[0] - (1.0 - 0.5 * 27.0)).abs() < 1e-4);
        assert!(sink.is_empty());
    }
}
