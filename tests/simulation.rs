use glam::DVec2;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use soma::config::{self, SimConfig};
use soma::energy::Energy;
use soma::save_load::{self, Snapshot};
use soma::terrain::UniformTerrain;
use soma::{Environment, Genome, GenomeKind};

fn environment(seed: u64, food: f64) -> Environment {
    Environment::new(SimConfig::default(), seed, Box::new(UniformTerrain(food)))
}

#[test]
fn population_runs_and_stays_inside_the_world() {
    let mut env = environment(1, 0.5);
    assert_eq!(env.populate(24, &[]), 24);

    for _ in 0..120 {
        env.step();
    }
    let (xmin, ymin, xmax, ymax) = env.bounds();
    for view in env.views() {
        for p in &view.points {
            assert!(p.x >= xmin && p.x <= xmax, "x {} out of bounds", p.x);
            assert!(p.y >= ymin && p.y <= ymax, "y {} out of bounds", p.y);
        }
        assert!(view.energy > 0.0);
        assert!(view.speed <= config::VEL_MAX + 1e-9);
    }
    assert_eq!(env.grid().len(), env.len());
}

#[test]
fn starving_world_dies_out() {
    let mut config = SimConfig::default();
    config.energy.initial = 0.05;
    config.energy.feed_rate = 0.0;
    let mut env = Environment::new(config, 2, Box::new(UniformTerrain(0.0)));
    env.populate(10, &[GenomeKind::Bytes]);

    let mut deaths = 0;
    for _ in 0..200 {
        deaths += env.step().deaths;
        if env.is_empty() {
            break;
        }
    }
    assert!(env.is_empty());
    assert_eq!(deaths, 10);
}

#[test]
fn well_fed_organisms_reproduce() {
    let mut env = environment(3, 1.0);
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let genome = Genome::random(GenomeKind::Instruction, &mut rng).unwrap();
    let parent = env
        .spawn(genome, DVec2::new(1000.0, 1000.0), config::REPRODUCTION_THRESHOLD + 40.0, 0)
        .unwrap();

    let report = env.step();
    assert_eq!(report.births, 1);
    assert_eq!(env.len(), 2);
    let child = env
        .organisms()
        .iter()
        .find(|(id, _)| *id != parent)
        .map(|(_, org)| org)
        .unwrap();
    assert_eq!(child.generation, 1);
    assert_eq!(child.energy, Energy::new(config::OFFSPRING_ENERGY));
}

#[test]
fn snapshot_file_round_trip() {
    let mut env = environment(4, 0.7);
    env.populate(9, &[]);
    for _ in 0..10 {
        env.step();
    }

    let path = std::env::temp_dir().join(format!("soma_snapshot_{}.bin", std::process::id()));
    save_load::save_to_file(&env, &path).unwrap();
    let mut restored = save_load::load_from_file(&path, Box::new(UniformTerrain(0.7))).unwrap();
    let _ = std::fs::remove_file(&path);

    assert_eq!(restored.tick_count(), env.tick_count());
    assert_eq!(restored.views(), env.views());
    for _ in 0..10 {
        assert_eq!(restored.step(), env.step());
    }
    assert_eq!(restored.views(), env.views());
    assert_eq!(Snapshot::capture(&restored).len(), env.len());
}

#[test]
fn json_config_feeds_the_environment() {
    let cfg = SimConfig::from_json_str(r#"{ "world": { "max_x": 640.0, "max_y": 480.0 } }"#).unwrap();
    let env = Environment::new(cfg, 5, Box::new(UniformTerrain(0.5)));
    assert_eq!(env.bounds(), (0.0, 0.0, 640.0, 480.0));
}
