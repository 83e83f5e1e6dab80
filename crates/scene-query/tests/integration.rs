//! Integration tests for scene-query

use pretty_assertions::assert_eq;
use scene_query::memory::{MemoryScene, ProviderCall};
use scene_query::prelude::*;
use scene_query::{EvalConfig, Evaluator, RelativeKind};

// ============================================================================
// Fixture
// ============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A small studio:
///
/// ```text
/// |room               transform
///   |room|wall        transform  ty=1.5 translate=(0, 1.5, 0)
///     |wallShape      mesh
///   |room|floor       transform  ty=0
///     |floorShape     mesh
///   |room|window      transform
/// |key                transform
///   |keyShape         pointLight
/// |persp              transform
///   |perspShape       camera
/// |top                transform
///   |topShape         camera
/// ```
fn studio() -> MemoryScene {
    init_tracing();

    let mut world = MemoryScene::new();
    let room = world.spawn("transform", "room", None);
    let wall = world.spawn("transform", "wall", Some(&room));
    world.spawn("mesh", "wallShape", Some(&wall));
    let floor = world.spawn("transform", "floor", Some(&room));
    world.spawn("mesh", "floorShape", Some(&floor));
    world.spawn("transform", "window", Some(&room));

    for (name, shape, ty) in [
        ("key", "keyShape", "pointLight"),
        ("persp", "perspShape", "camera"),
        ("top", "topShape", "camera"),
    ] {
        let xform = world.spawn("transform", name, None);
        world.spawn(ty, shape, Some(&xform));
    }

    world.set_attribute(&wall, "ty", 1.5);
    world.set_attribute(&wall, "translate", [0.0, 1.5, 0.0]);
    world.set_attribute(&floor, "ty", 0.0);
    world.reset_calls();
    world
}

fn paths(items: &[Item]) -> Vec<String> {
    items.iter().map(|i| i.key().to_string()).collect()
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_construction_is_idempotent() -> QueryResult<()> {
    let world = studio();
    let shapes = meshes();
    let before = shapes.to_string();

    let walls = shapes.like("wall")?;
    let _floors = shapes.like("floor")?;

    // Chaining never touches the receiver.
    assert_eq!(shapes.to_string(), before);
    assert_eq!(shapes.to_vec(&world)?, shapes.to_vec(&world)?);
    assert_eq!(shapes.count(&world)?, 2);
    assert_eq!(walls.to_vec(&world)?, ["|room|wall|wallShape"]);
    Ok(())
}

#[test]
fn test_invalid_expressions_fail_at_construction() {
    assert!(matches!(
        scene().of_type(Vec::<&str>::new()),
        Err(QueryError::InvalidExpression(_))
    ));
    assert!(matches!(
        nodes_of_type(Vec::<String>::new()),
        Err(QueryError::InvalidExpression(_))
    ));
    assert!(matches!(
        scene().like("wall("),
        Err(QueryError::InvalidExpression(_))
    ));
}

// ============================================================================
// Fusion
// ============================================================================

#[test]
fn test_fused_type_chain_issues_one_call() -> QueryResult<()> {
    let world = studio();
    let q = scene()
        .of_type(["mesh"])?
        .of_type(["light"])?
        .of_type(["camera"])?;

    let fused = q.to_vec(&world)?;
    assert_eq!(
        paths(&fused),
        [
            "|room|wall|wallShape",
            "|room|floor|floorShape",
            "|key|keyShape",
            "|persp|perspShape",
            "|top|topShape",
        ]
    );
    assert_eq!(world.call_count(), 1);

    world.reset_calls();
    let unfused = Evaluator::with_config(&world, EvalConfig::unfused()).evaluate(&q)?;
    assert_eq!(unfused, fused);
    // scene enumerate + one per filter
    assert_eq!(world.call_count(), 4);
    Ok(())
}

#[test]
fn test_type_filter_after_relation() -> QueryResult<()> {
    let world = studio();
    let q = transforms().children().of_type(["camera"])?;
    assert_eq!(
        paths(&q.to_vec(&world)?),
        ["|persp|perspShape", "|top|topShape"]
    );
    // enumerate + relatives + fused filter
    assert_eq!(world.call_count(), 3);
    Ok(())
}

// ============================================================================
// Name filters
// ============================================================================

#[test]
fn test_like_and_unlike() -> QueryResult<()> {
    let world = studio();

    assert_eq!(transforms().like("wall")?.to_vec(&world)?, ["|room|wall"]);
    assert_eq!(
        transforms().unlike("o")?.to_vec(&world)?,
        ["|room|wall", "|key", "|persp"]
    );
    Ok(())
}

#[test]
fn test_like_is_case_sensitive_unless_flagged() -> QueryResult<()> {
    let world = studio();

    assert!(transforms().like("WALL")?.to_vec(&world)?.is_empty());
    let q = transforms().like_with("WALL", RegexFlags::IGNORE_CASE)?;
    assert_eq!(q.to_vec(&world)?, ["|room|wall"]);
    Ok(())
}

#[test]
fn test_named_source_globs_in_provider() -> QueryResult<()> {
    let world = studio();
    let q = named("*Shape").of_type(["camera"])?;
    assert_eq!(q.to_vec(&world)?, ["|persp|perspShape", "|top|topShape"]);
    assert_eq!(
        world.calls(),
        [ProviderCall::Enumerate {
            types: ["camera"].into_iter().collect(),
            pattern: Some("*Shape".into()),
        }]
    );
    Ok(())
}

// ============================================================================
// Predicates
// ============================================================================

#[test]
fn test_lenient_predicate_excludes_missing() -> QueryResult<()> {
    let world = studio();

    let raised = transforms().where_(attr("ty").gt(0.0));
    assert_eq!(raised.to_vec(&world)?, ["|room|wall"]);

    let grounded = transforms().where_not(attr("ty").gt(0.0));
    assert_eq!(
        grounded.to_vec(&world)?,
        ["|room", "|room|floor", "|room|window", "|key", "|persp", "|top"]
    );
    Ok(())
}

#[test]
fn test_strict_predicate_raises_on_missing() {
    let world = studio();
    let q = transforms().where_(attr("ty").strict().gt(0.0));

    assert_eq!(
        q.to_vec(&world),
        Err(QueryError::AttributeNotFound {
            object: "|room".into(),
            attribute: "ty".into(),
        })
    );
}

#[test]
fn test_truthy_closure_predicate() -> QueryResult<()> {
    let world = studio();
    let has_o = Predicate::truthy(|item: &Item| item.leaf_name().matches('o').count() as i64);

    assert_eq!(
        transforms().where_(has_o.clone()).to_vec(&world)?,
        ["|room", "|room|floor", "|room|window", "|top"]
    );
    assert_eq!(
        transforms().where_not(has_o).to_vec(&world)?,
        ["|room|wall", "|key", "|persp"]
    );
    Ok(())
}

#[test]
fn test_closure_predicates_compose() -> QueryResult<()> {
    let world = studio();
    let short = Predicate::new(|item| item.leaf_name().len() <= 3);
    let q = transforms().where_(short.or(attr("ty").exists()));
    assert_eq!(
        q.to_vec(&world)?,
        ["|room|wall", "|room|floor", "|key", "|top"]
    );
    Ok(())
}

// ============================================================================
// Set algebra
// ============================================================================

#[test]
fn test_difference_is_asymmetric() -> QueryResult<()> {
    let world = studio();
    let q = transforms().like("o")?;
    let o = transforms().where_(attr("ty").exists());

    assert_eq!((&q - &o).to_vec(&world)?, ["|room", "|room|window", "|top"]);
    assert_eq!((&o - &q).to_vec(&world)?, ["|room|wall"]);
    Ok(())
}

#[test]
fn test_symmetric_difference_is_both_differences() -> QueryResult<()> {
    let world = studio();
    let q = transforms().like("o")?;
    let o = transforms().where_(attr("ty").exists());

    let xor = (&q ^ &o).to_vec(&world)?;
    let both = ((&q - &o) | (&o - &q)).to_vec(&world)?;
    assert_eq!(xor, both);
    assert_eq!(xor, ["|room", "|room|window", "|top", "|room|wall"]);
    Ok(())
}

#[test]
fn test_union_and_intersect() -> QueryResult<()> {
    let world = studio();
    let lit = lights().parents();
    let seen = cameras().parents();

    assert_eq!(
        lit.union(&seen).to_vec(&world)?,
        ["|key", "|persp", "|top"]
    );
    assert!(lit.intersect(&seen).to_vec(&world)?.is_empty());
    assert_eq!(
        (transforms() & seen).to_vec(&world)?,
        ["|persp", "|top"]
    );
    Ok(())
}

// ============================================================================
// Relations
// ============================================================================

#[test]
fn test_relation_is_one_batched_call() -> QueryResult<()> {
    let world = studio();
    let shapes = transforms().shapes().to_vec(&world)?;

    assert_eq!(
        paths(&shapes),
        [
            "|room|wall|wallShape",
            "|room|floor|floorShape",
            "|key|keyShape",
            "|persp|perspShape",
            "|top|topShape",
        ]
    );
    assert_eq!(
        world.calls()[1],
        ProviderCall::Relatives {
            kind: RelativeKind::Shape,
            batch: 7,
            full_path: true,
        }
    );
    assert_eq!(world.call_count(), 2);
    Ok(())
}

#[test]
fn test_empty_upstream_skips_relation_call() -> QueryResult<()> {
    let world = studio();
    assert!(transforms().like("nothing")?.children().to_vec(&world)?.is_empty());
    assert_eq!(world.call_count(), 1);
    Ok(())
}

#[test]
fn test_relations_deduplicate() -> QueryResult<()> {
    let world = studio();
    // Both meshes share a grandparent.
    assert_eq!(meshes().parents().parents().to_vec(&world)?, ["|room"]);
    Ok(())
}

#[test]
fn test_leaves_and_descendants() -> QueryResult<()> {
    let world = studio();
    let room = transforms().like("^room$")?;

    assert_eq!(room.leaves().to_vec(&world)?, ["|room|window"]);
    assert_eq!(
        room.descendants().to_vec(&world)?,
        [
            "|room|wall",
            "|room|wall|wallShape",
            "|room|floor",
            "|room|floor|floorShape",
            "|room|window",
        ]
    );
    Ok(())
}

#[test]
fn test_history_and_future() -> QueryResult<()> {
    let mut world = studio();
    let cube = world.spawn("polyCube", "polyCube1", None);
    let shape: ObjectId = "|room|wall|wallShape".into();
    world.connect(&cube, &shape);

    assert_eq!(meshes().like("wall")?.history().to_vec(&world)?, ["|polyCube1"]);
    assert_eq!(
        nodes_of_type(["polyCube"])?.future().to_vec(&world)?,
        ["|room|wall|wallShape"]
    );
    Ok(())
}

#[test]
fn test_short_identifiers() -> QueryResult<()> {
    let world = studio();
    let config = EvalConfig {
        full_paths: false,
        ..EvalConfig::default()
    };
    let q = cameras().parents();
    let items = Evaluator::with_config(&world, config).evaluate(&q)?;
    assert_eq!(items, ["persp", "top"]);
    Ok(())
}

#[test]
fn test_short_identifier_mode_keeps_full_paths_exact() -> QueryResult<()> {
    let mut world = MemoryScene::new();
    let a = world.spawn("transform", "a", None);
    let b = world.spawn("transform", "b", None);
    world.spawn("mesh", "geo", Some(&a));
    world.spawn("transform", "geo", Some(&b));

    let short = EvalConfig {
        full_paths: false,
        ..EvalConfig::default()
    };
    let q = scene().like("^geo$")?.of_type(["mesh"])?;
    for config in [EvalConfig::default(), short, EvalConfig { fusion: false, ..short }] {
        let items = Evaluator::with_config(&world, config).evaluate(&q)?;
        assert_eq!(items, ["|a|geo"]);
    }

    // Short names from relations still match by leaf name.
    let shapes = nodes_of_type(["transform"])?.children().of_type(["mesh"])?;
    let items = Evaluator::with_config(&world, short).evaluate(&shapes)?;
    assert_eq!(items, ["geo"]);
    Ok(())
}

// ============================================================================
// Projections and coercions
// ============================================================================

#[test]
fn test_translations_to_map() -> QueryResult<()> {
    let world = studio();
    let map = transforms().like("wall")?.translations().to_map(&world)?;

    assert_eq!(map.len(), 1);
    assert_eq!(
        map.get("|room|wall"),
        Some(&Value::Vector([0.0, 1.5, 0.0]))
    );
    Ok(())
}

#[test]
fn test_projection_propagates_missing_attribute() {
    let world = studio();
    let err = transforms().translations().to_vec(&world).unwrap_err();
    assert_eq!(
        err,
        QueryError::AttributeNotFound {
            object: "|room".into(),
            attribute: "translate".into(),
        }
    );
}

#[test]
fn test_world_positions_batch() -> QueryResult<()> {
    let mut world = studio();
    world.set_attribute(&"|room".into(), "translate", [1.0, 0.0, 0.0]);
    world.reset_calls();

    let items = meshes().world_positions().to_vec(&world)?;
    assert_eq!(
        items,
        [
            Item::Pair("|room|wall|wallShape".into(), Value::Vector([1.0, 1.5, 0.0])),
            Item::Pair("|room|floor|floorShape".into(), Value::Vector([1.0, 0.0, 0.0])),
        ]
    );
    assert_eq!(world.call_count(), 2);
    Ok(())
}

#[test]
fn test_cast_and_short_names() -> QueryResult<()> {
    let world = studio();
    let lengths = cameras().cast(|item| Value::from(item.leaf_name().len() as i64));
    assert_eq!(
        lengths.to_vec(&world)?,
        [Item::Value(Value::Int(10)), Item::Value(Value::Int(8))]
    );

    let names = meshes().short_names().sorted().to_vec(&world)?;
    assert_eq!(
        names,
        [
            Item::Value("floorShape".into()),
            Item::Value("wallShape".into())
        ]
    );

    // Values have no identity in the scene.
    assert!(matches!(
        names_only_relation(&world),
        Err(QueryError::NotAnObject { .. })
    ));
    Ok(())
}

fn names_only_relation(world: &MemoryScene) -> QueryResult<Vec<Item>> {
    meshes().short_names().parents().to_vec(world)
}

#[test]
fn test_to_array_and_first() -> QueryResult<()> {
    let world = studio();

    let [persp, top] = cameras().to_array::<2>(&world)?;
    assert_eq!(persp, "|persp|perspShape");
    assert_eq!(top, "|top|topShape");
    assert_eq!(
        cameras().to_array::<3>(&world).unwrap_err(),
        QueryError::LengthMismatch {
            expected: 3,
            actual: 2
        }
    );
    assert_eq!(lights().first(&world)?, Some(Item::Object("|key|keyShape".into())));
    assert_eq!(meshes().to_map(&world).unwrap_err(), QueryError::NotAPair {
        item: "|room|wall|wallShape".into()
    });
    Ok(())
}

#[test]
fn test_take_limits_provider_order() -> QueryResult<()> {
    let world = studio();
    let q = scene().of_type(["shape"])?.take(2);
    assert_eq!(q.to_vec(&world)?, ["|room|wall|wallShape", "|room|floor|floorShape"]);
    Ok(())
}

// ============================================================================
// Live evaluation
// ============================================================================

#[test]
fn test_reevaluation_sees_live_state() -> QueryResult<()> {
    let mut world = studio();
    let q = transforms().where_(attr("ty").gt(0.0));
    assert_eq!(q.count(&world)?, 1);

    world.set_attribute(&"|key".into(), "ty", 3);
    assert_eq!(q.to_vec(&world)?, ["|room|wall", "|key"]);

    world.despawn(&"|room".into());
    assert_eq!(q.to_vec(&world)?, ["|key"]);
    assert_eq!(meshes().count(&world)?, 0);
    Ok(())
}

#[test]
fn test_bound_query_iterates_afresh() -> QueryResult<()> {
    let mut world = studio();
    let q = cameras();

    let count = {
        let bound = q.bind(&world);
        let first: Vec<Item> = (&bound).into_iter().collect::<QueryResult<_>>()?;
        let second = bound.evaluate()?;
        assert_eq!(first, second);
        first.len()
    };
    assert_eq!(count, 2);

    world.spawn("camera", "side", None);
    assert_eq!(q.bind(&world).iter()?.count(), 3);
    Ok(())
}

// ============================================================================
// Provider failures
// ============================================================================

#[test]
fn test_unavailable_provider_propagates() {
    let mut world = studio();
    world.set_unavailable(true);

    assert!(matches!(
        meshes().to_vec(&world),
        Err(QueryError::ProviderUnavailable(_))
    ));

    let q = meshes();
    let bound = q.bind(&world);
    let results: Vec<_> = (&bound).into_iter().collect();
    assert_eq!(results.len(), 1);
    assert!(matches!(results[0], Err(QueryError::ProviderUnavailable(_))));
}
