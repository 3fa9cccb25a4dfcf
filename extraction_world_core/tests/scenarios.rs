//! End-to-end walkthroughs of scenes and training runs through the public API.

use std::sync::Arc;

use extraction_world_core::{
    Action, Point,
    config::LearningParameters,
    learning::{LearningEngine, RewardEvent},
    map::GridMap,
    scene::{CellKind, Scene},
};

const SMALL_DEPOT: &str = "I....\n.....\n...PE";

fn depot() -> Arc<GridMap> {
    Arc::new(SMALL_DEPOT.parse().unwrap())
}

fn walk(scene: &mut Scene, actions: &[Action]) {
    for action in actions {
        assert!(
            scene.move_agent(action.vector()).moved,
            "{action:?} from {:?} was rejected",
            scene.agent_position()
        );
    }
}

#[test]
fn depot_map_layout() {
    let map = depot();
    assert_eq!((map.width(), map.height()), (5, 3));
    for x in -1..=5 {
        for y in -1..=3 {
            let point = Point::new(x, y);
            let inside = (0..5).contains(&x) && (0..3).contains(&y);
            assert_eq!(map.is_reachable(point), inside, "{point:?}");
            assert_eq!(
                map.is_within_extraction_area(point),
                point == Point::new(4, 2),
                "{point:?}"
            );
        }
    }
}

#[test]
fn walking_east_along_the_top_row() {
    let mut scene = Scene::new(depot()).unwrap();
    assert_eq!(scene.agent_position(), Point::new(0, 0));
    walk(&mut scene, &[Action::East; 4]);
    assert_eq!(scene.agent_position(), Point::new(4, 0));

    // The east edge stops further progress.
    assert!(!scene.move_agent(Action::East.vector()).moved);
    assert_eq!(scene.agent_position(), Point::new(4, 0));
}

#[test]
fn capture_from_the_west_and_deliver() {
    let mut scene = Scene::new(depot()).unwrap();
    walk(
        &mut scene,
        &[Action::East, Action::East, Action::South, Action::South],
    );
    assert_eq!(scene.agent_position(), Point::new(2, 2));
    assert!(!scene.is_package_captured());
    assert!(!scene.is_goal_achieved());

    let outcome = scene.move_agent(Action::East.vector());
    assert!(outcome.captured_now);
    assert!(outcome.moved);
    assert_eq!(scene.agent_position(), Point::new(3, 2));
    assert_eq!(scene.package_position(), Point::new(4, 2));
    assert!(scene.is_goal_achieved());
    assert_eq!(scene.classify(Point::new(4, 2)), CellKind::Package);
}

#[test]
fn carried_package_moves_with_the_agent() {
    let mut scene = Scene::new(depot()).unwrap();
    walk(
        &mut scene,
        &[Action::East, Action::East, Action::South, Action::South],
    );
    // Capture happens first, then the pair moves north together.
    walk(&mut scene, &[Action::North]);
    assert!(scene.is_package_captured());
    assert_eq!(scene.agent_position(), Point::new(2, 1));
    assert_eq!(scene.package_position(), Point::new(3, 1));
    assert_eq!(
        scene.agent().occupied_area(),
        vec![Point::new(2, 1), Point::new(3, 1)]
    );

    walk(&mut scene, &[Action::East]);
    assert_eq!(scene.agent_position(), Point::new(3, 1));
    assert_eq!(scene.package_position(), Point::new(4, 1));

    // The package would leave the map.
    assert!(!scene.move_agent(Action::East.vector()).moved);
    assert_eq!(scene.package_position(), Point::new(4, 1));
    assert!(!scene.is_goal_achieved());

    walk(&mut scene, &[Action::South]);
    assert!(scene.is_goal_achieved());
}

#[test]
fn loose_package_blocks_the_agent() {
    let mut scene = Scene::new(depot()).unwrap();
    walk(&mut scene, &[Action::East, Action::East, Action::East, Action::South]);
    assert_eq!(scene.agent_position(), Point::new(3, 1));
    assert!(!scene.move_agent(Action::South.vector()).moved);
    assert_eq!(scene.agent_position(), Point::new(3, 1));
    assert!(!scene.is_package_captured());
}

#[test]
fn corridor_training_learns_to_push_east() {
    let map = Arc::new("IPE".parse::<GridMap>().unwrap());
    let mut engine = LearningEngine::with_seed(map, LearningParameters::default(), 42).unwrap();

    let report = engine.train(25);
    assert_eq!(report.episodes.len(), 25);
    assert!(report.episodes.iter().all(|e| e.cycles >= 1));
    assert_eq!(engine.episodes_run(), 25);

    let spawn = Point::new(0, 0);
    assert!(engine.table().get(spawn, Action::East) > 0.0);
    for action in [Action::North, Action::South, Action::West] {
        assert!(engine.table().get(spawn, action) <= 0.0);
    }
    assert_eq!(engine.greedy_action(spawn), Some(Action::East));

    engine
        .set_parameters(LearningParameters {
            exploration_rate: 0.0,
            ..Default::default()
        })
        .unwrap();
    engine.reset();
    let transition = engine.step();
    assert_eq!(transition.action, Action::East);
    assert_eq!(transition.event, RewardEvent::PackageExtraction);
    assert!(transition.goal_achieved);
}

#[test]
fn open_yard_training_terminates() {
    let map = Arc::new("I.....\n......\n..P.E.".parse::<GridMap>().unwrap());
    let mut engine = LearningEngine::with_seed(map, LearningParameters::default(), 2024).unwrap();
    let report = engine.train(30);
    assert_eq!(report.episodes.len(), 30);
    assert!(report.best_cycles().unwrap() >= 5);
    assert!(report.mean_cycles_of_last(10).is_some());
}

#[test]
fn bundled_maps_are_well_formed() {
    for source in [
        include_str!("../../maps/warehouse.txt"),
        include_str!("../../maps/depot.txt"),
    ] {
        let map: GridMap = source.parse().unwrap();
        assert!(map.agent_spawn().is_some());
        assert!(map.package_spawn().is_some());
        assert!(!map.extraction_area().is_empty());
        assert!(Scene::new(Arc::new(map)).is_ok());
    }
}
