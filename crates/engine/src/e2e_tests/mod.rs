//! End-to-end scenarios over the full stack: router, services, and the
//! in-memory stores, with a scripted roller supplying the exact die
//! faces each scenario calls for.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use ttasolo_domain::{
    AbilityScores, AbilitySource, ActionCost, CharacterStats, Cover, EffectDuration,
    Entity, EntityKind, EventOutcome, EventType, GmMoveType, ItemStats, ModifierAmount,
    ModifierKind, PhysicsOverlay, ResourceMechanism, RestKind, SourceKind, Targeting,
    UnifiedAbility, UsageDieSize,
};

use crate::infrastructure::memory::{InMemoryGraphRepo, InMemoryTruthRepo};
use crate::infrastructure::ports::{GraphRepo, TruthRepo};
use crate::infrastructure::rng::ScriptedRoller;
use crate::seed::{seed_demo_world, SeededWorld};
use crate::use_cases::effects::EffectPipeline;
use crate::use_cases::{Intent, MoveExecutor, MovePrompts, MultiverseService, TurnRouter};

struct Stack {
    truth: Arc<dyn TruthRepo>,
    graph: Arc<dyn GraphRepo>,
    world: SeededWorld,
}

async fn stack() -> Stack {
    let truth: Arc<dyn TruthRepo> = Arc::new(InMemoryTruthRepo::new());
    let graph: Arc<dyn GraphRepo> = Arc::new(InMemoryGraphRepo::new());
    let world = seed_demo_world(&truth, &graph).await.unwrap();
    Stack {
        truth,
        graph,
        world,
    }
}

fn router_with(stack: &Stack, faces: Vec<u32>) -> TurnRouter {
    let moves = MoveExecutor::new(
        stack.truth.clone(),
        stack.graph.clone(),
        None,
        MovePrompts::default(),
    );
    TurnRouter::new(
        stack.truth.clone(),
        stack.graph.clone(),
        moves,
        Box::new(ScriptedRoller::new(faces)),
    )
}

/// Scenario 1: natural 20 against AC 14 with a proficient STR 16 attacker
/// crits, doubles the damage dice, and adds the ability modifier once.
#[tokio::test]
async fn scenario_attack_with_critical() {
    let stack = stack().await;
    // d20 = 20 (crit), damage 2d8 = [5, 7].
    let mut router = router_with(&stack, vec![20, 5, 7]);

    let result = router
        .run_turn(
            stack.world.universe.id,
            stack.world.hero.id,
            Intent::Attack {
                target: stack.world.goblin.id,
                weapon: stack.world.longsword.id,
                cover: Cover::None,
            },
            Utc::now(),
        )
        .await
        .unwrap();

    let attack = result.skill_result.attack.unwrap();
    assert!(attack.hit);
    assert!(attack.critical);
    assert!(!attack.fumble);
    assert_eq!(attack.attack_roll, 20);
    // 20 + 3 STR + 2 proficiency.
    assert_eq!(attack.total_attack, 25);
    // [5 + 7] + 3 STR.
    assert_eq!(attack.damage, Some(15));
    assert_eq!(attack.damage_type.as_deref(), Some("slashing"));
    assert_eq!(result.skill_result.outcome, EventOutcome::StrongHit);

    // 15 damage kills the 7 HP goblin.
    let goblin = stack
        .truth
        .load_entity(stack.world.universe.id, stack.world.goblin.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(goblin.as_character().unwrap().hp, 0);
    assert!(goblin.as_character().unwrap().dead);

    let events = stack
        .truth
        .list_events(stack.world.universe.id, None)
        .await
        .unwrap();
    let combat = events
        .iter()
        .find(|e| e.event_type == EventType::CombatRound)
        .unwrap();
    assert_eq!(combat.outcome, EventOutcome::StrongHit);
    assert_eq!(combat.payload["target_death"], json!(true));
    assert!(events.iter().any(|e| e.event_type == EventType::Death));
}

/// Scenario 2: a persuasion miss by more than five invokes the move
/// executor; at danger 3 with a quiet scene the selected move is
/// SHOW_DANGER, which creates nothing.
#[tokio::test]
async fn scenario_skill_check_miss_triggers_gm_move() {
    let stack = stack().await;
    // d20 = 5: total 6 with CHA +1, margin -9.
    let mut router = router_with(&stack, vec![5]);

    let result = router
        .run_turn(
            stack.world.universe.id,
            stack.world.hero.id,
            Intent::Persuade {
                target: stack.world.goblin.id,
                dc: 15,
            },
            Utc::now(),
        )
        .await
        .unwrap();

    assert!(!result.skill_result.success);
    let check = result.skill_result.check.unwrap();
    assert_eq!(check.total, 6);
    assert_eq!(check.margin, -9);
    assert_eq!(result.skill_result.outcome, EventOutcome::Miss);
    assert_eq!(result.skill_result.gm_move_type, Some(GmMoveType::ShowDanger));
    assert!(result.skill_result.entities_created.is_empty());
}

/// Scenario 3: fork, then kill the king in the fork only. The parent
/// keeps the original through both stores; the fork resolves a variant
/// carrying a VARIANT_OF edge to the canonical.
#[tokio::test]
async fn scenario_fork_then_diverge() {
    let stack = stack().await;
    let multiverse = MultiverseService::new(stack.truth.clone(), stack.graph.clone());

    let king = Entity::new(
        stack.world.universe.id,
        "King Aldric",
        EntityKind::Character(CharacterStats::new(10, 60, 18, AbilityScores::all_tens()).unwrap()),
    );
    let king = stack.truth.save_entity(&king).await.unwrap();
    stack.graph.upsert_node(&king).await.unwrap();

    let fork = multiverse
        .fork_universe(
            stack.world.universe.id,
            "regicide",
            "what if the king dies",
            stack.world.hero.id,
            Utc::now(),
        )
        .await
        .unwrap();

    let mut doomed = stack
        .truth
        .load_entity(fork.child.id, king.id)
        .await
        .unwrap()
        .unwrap();
    doomed.as_character_mut().unwrap().apply_damage(999);
    multiverse.write_entity(doomed).await.unwrap();

    let original = multiverse
        .get_entity(stack.world.universe.id, king.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(original.as_character().unwrap().hp, 60);

    let variant = multiverse
        .get_entity(fork.child.id, king.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(variant.as_character().unwrap().hp, 0);
    assert_ne!(variant.id, king.id);
    let edges = stack
        .graph
        .query_relationships(fork.child.id, variant.id)
        .await
        .unwrap();
    assert!(edges.iter().any(|e| {
        e.kind == ttasolo_domain::RelationshipKind::VariantOf && e.to == king.id
    }));
}

/// Scenario 4: a level 6 solo actor's fray die (d8) lands on a goblin
/// (HD 1), never the hobgoblin (HD 4 is eligible, but the lowest hit
/// dice soak first); a 7 kills one goblin exactly.
#[tokio::test]
async fn scenario_fray_die_round() {
    let stack = stack().await;
    let universe = stack.world.universe.id;

    let mut hero = stack
        .truth
        .load_entity(universe, stack.world.hero.id)
        .await
        .unwrap()
        .unwrap();
    hero.as_character_mut().unwrap().level = 6;
    let hero = stack.truth.save_entity(&hero).await.unwrap();

    let mut enemy_ids = Vec::new();
    for name in ["Goblin A", "Goblin B", "Goblin C"] {
        let mut stats = CharacterStats::new(
            1,
            7,
            13,
            AbilityScores::new(8, 14, 10, 10, 8, 8).unwrap(),
        )
        .unwrap();
        stats.hit_dice = 1;
        let goblin = Entity::new(universe, name, EntityKind::Character(stats));
        let goblin = stack.truth.save_entity(&goblin).await.unwrap();
        stack.graph.upsert_node(&goblin).await.unwrap();
        enemy_ids.push(goblin.id);
    }
    let mut hob_stats = CharacterStats::new(
        4,
        22,
        15,
        AbilityScores::new(13, 12, 12, 10, 10, 9).unwrap(),
    )
    .unwrap();
    hob_stats.hit_dice = 4;
    let hobgoblin = Entity::new(universe, "Hobgoblin", EntityKind::Character(hob_stats));
    let hobgoblin = stack.truth.save_entity(&hobgoblin).await.unwrap();
    stack.graph.upsert_node(&hobgoblin).await.unwrap();
    enemy_ids.push(hobgoblin.id);

    // Fray d8 = 7.
    let mut router = router_with(&stack, vec![7]);
    let events = router
        .begin_combat_round(universe, hero.id, &enemy_ids, 1, false, Utc::now())
        .await
        .unwrap();
    assert_eq!(events.len(), 1);

    let log = stack.truth.list_events(universe, None).await.unwrap();
    let fray = log
        .iter()
        .find(|e| e.event_type == EventType::CombatRound)
        .unwrap();
    assert_eq!(fray.outcome, EventOutcome::Hit);
    assert_eq!(fray.payload["fray_die"], json!("d8"));
    assert_eq!(fray.payload["damage"], json!(7));
    assert_eq!(fray.payload["target_death"], json!(true));

    // One goblin died; the hobgoblin is untouched.
    let hob = stack
        .truth
        .load_entity(universe, hobgoblin.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(hob.as_character().unwrap().hp, 22);
    let dead_goblins = {
        let mut count = 0;
        for id in &enemy_ids[..3] {
            let goblin = stack.truth.load_entity(universe, *id).await.unwrap().unwrap();
            if goblin.as_character().unwrap().dead {
                count += 1;
            }
        }
        count
    };
    assert_eq!(dead_goblins, 1);
}

/// Scenario 5: 18 damage forces a DC 10 concentration save; a 4 + 1 CON
/// fails it, Bless drops from every blessed ally, and a
/// CONCENTRATION_BROKEN event lands in the log.
#[tokio::test]
async fn scenario_concentration_broken() {
    let stack = stack().await;
    let universe = stack.world.universe.id;

    let mut caster_stats = CharacterStats::new(
        5,
        38,
        13,
        AbilityScores::new(10, 10, 12, 10, 14, 16).unwrap(),
    )
    .unwrap();
    caster_stats.resources = ttasolo_domain::ResourcePool::empty().with_spell_slots(&[(1, 2)]);
    let caster = Entity::new(universe, "War Cleric", EntityKind::Character(caster_stats));
    let mut caster = stack.truth.save_entity(&caster).await.unwrap();
    stack.graph.upsert_node(&caster).await.unwrap();

    let ally = Entity::new(
        universe,
        "Shield Bearer",
        EntityKind::Character(
            CharacterStats::new(2, 18, 16, AbilityScores::all_tens()).unwrap(),
        ),
    );
    let mut ally = stack.truth.save_entity(&ally).await.unwrap();
    stack.graph.upsert_node(&ally).await.unwrap();

    // Cast Bless on the ally: no dice roll at application time.
    let pipeline = EffectPipeline::new();
    let mut scratch = ScriptedRoller::new(vec![1]);
    let bless = stack.world.bless.clone();
    {
        let mut targets = [&mut ally];
        pipeline
            .apply_ability_effects(
                &mut caster,
                &mut targets,
                &bless,
                &PhysicsOverlay::default(),
                1,
                &mut scratch,
            )
            .unwrap();
    }
    let ally = stack.truth.save_entity(&ally).await.unwrap();
    let caster = stack.truth.save_entity(&caster).await.unwrap();
    assert_eq!(ally.as_character().unwrap().active_effects.len(), 1);

    // A heavy maul swing: d20 = 15 hits AC 13, damage 2d8 = [8, 7] + 3
    // STR = 18, then the caster's CON save d20 = 4 (+1) = 5 fails DC 10.
    let maul = Entity::new(
        universe,
        "maul",
        EntityKind::Item(ItemStats::weapon(10.0, 60, "2d8", "bludgeoning")),
    );
    let maul = stack.truth.save_entity(&maul).await.unwrap();

    let mut router = router_with(&stack, vec![15, 8, 7, 4]);
    let result = router
        .run_turn(
            universe,
            stack.world.hero.id,
            Intent::Attack {
                target: caster.id,
                weapon: maul.id,
                cover: Cover::None,
            },
            Utc::now(),
        )
        .await
        .unwrap();
    assert_eq!(result.skill_result.attack.unwrap().damage, Some(18));

    // Concentration is gone and so is the ally's Bless.
    let caster_after = stack
        .truth
        .load_entity(universe, caster.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        caster_after
            .as_character()
            .unwrap()
            .resources
            .solo
            .concentrating_on,
        None
    );
    let ally_after = stack
        .truth
        .load_entity(universe, ally.id)
        .await
        .unwrap()
        .unwrap();
    assert!(ally_after.as_character().unwrap().active_effects.is_empty());

    let log = stack.truth.list_events(universe, None).await.unwrap();
    let broken = log
        .iter()
        .find(|e| e.event_type == EventType::ConcentrationBroken)
        .unwrap();
    assert_eq!(broken.payload["dc"], json!(10));
    assert_eq!(broken.roll, Some(5));
}

/// Scenario 6: a torch usage die at d6 degrades to d4 on a 2; a short
/// rest leaves it alone and a long rest restores it.
#[tokio::test]
async fn scenario_usage_die_degradation_and_rest() {
    let stack = stack().await;
    let universe = stack.world.universe.id;

    let torchlight = UnifiedAbility::new(
        "Torchlight",
        AbilitySource {
            kind: SourceKind::Tech,
            subtype: "gear".into(),
        },
        ResourceMechanism::UsageDie {
            name: "torch".into(),
            initial: UsageDieSize::D6,
        },
        Targeting::self_only(),
        ActionCost::Free,
    )
    .with_modifier(
        "skill_check",
        ModifierKind::Bonus,
        ModifierAmount::Flat(1),
        EffectDuration::until_rest(),
    );

    // Usage die roll = 2: in the degrade set.
    let mut router = router_with(&stack, vec![2]);
    router.register_ability(torchlight.clone()).unwrap();

    router
        .run_turn(
            universe,
            stack.world.hero.id,
            Intent::UseAbility {
                ability: torchlight.id,
                targets: vec![],
            },
            Utc::now(),
        )
        .await
        .unwrap();

    let torch_die = |entity: &Entity| {
        entity.as_character().unwrap().resources.usage_dice["torch"]
            .current
    };

    let hero = stack
        .truth
        .load_entity(universe, stack.world.hero.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(torch_die(&hero), Some(UsageDieSize::D4));

    // Short rest: unchanged.
    router
        .run_turn(
            universe,
            stack.world.hero.id,
            Intent::Rest {
                kind: RestKind::Short,
            },
            Utc::now(),
        )
        .await
        .unwrap();
    let hero = stack
        .truth
        .load_entity(universe, stack.world.hero.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(torch_die(&hero), Some(UsageDieSize::D4));

    // Long rest: back to d6.
    router
        .run_turn(
            universe,
            stack.world.hero.id,
            Intent::Rest {
                kind: RestKind::Long,
            },
            Utc::now(),
        )
        .await
        .unwrap();
    let hero = stack
        .truth
        .load_entity(universe, stack.world.hero.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(torch_die(&hero), Some(UsageDieSize::D6));
}

/// Unknown intents yield a failed result with reason "unclear" and leave
/// the log and pools untouched.
#[tokio::test]
async fn unclear_intent_consumes_nothing() {
    let stack = stack().await;
    let mut router = router_with(&stack, vec![20]);

    let result = router
        .run_turn(
            stack.world.universe.id,
            stack.world.hero.id,
            Intent::Unclear {
                raw: Some("flirt with the dragon".into()),
            },
            Utc::now(),
        )
        .await
        .unwrap();
    assert!(!result.skill_result.success);
    assert_eq!(result.skill_result.reason.as_deref(), Some("unclear"));
    assert!(result.events.is_empty());
    assert!(stack
        .truth
        .list_events(stack.world.universe.id, None)
        .await
        .unwrap()
        .is_empty());
}

/// Moving through a named exit is a strict location change recorded as a
/// TRAVEL event.
#[tokio::test]
async fn move_through_exit_emits_travel() {
    let stack = stack().await;
    let mut router = router_with(&stack, vec![1]);

    let result = router
        .run_turn(
            stack.world.universe.id,
            stack.world.hero.id,
            Intent::Move {
                direction: "down".into(),
            },
            Utc::now(),
        )
        .await
        .unwrap();
    assert!(result.skill_result.success);

    let log = stack
        .truth
        .list_events(stack.world.universe.id, None)
        .await
        .unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].event_type, EventType::Travel);
    assert_eq!(log[0].location_id, Some(stack.world.cellar.id));

    // The hero now stands in the cellar.
    let occupants = stack
        .graph
        .query_entities_at_location(stack.world.universe.id, stack.world.cellar.id)
        .await
        .unwrap();
    assert!(occupants.iter().any(|e| e.id == stack.world.hero.id));

    // And an unknown exit is a clean user error.
    let result = router
        .run_turn(
            stack.world.universe.id,
            stack.world.hero.id,
            Intent::Move {
                direction: "up".into(),
            },
            Utc::now(),
        )
        .await
        .unwrap();
    assert!(!result.skill_result.success);
}

/// Spending the last spell slot surfaces InsufficientResource as a
/// failed result without burning anything else.
#[tokio::test]
async fn out_of_slots_is_a_clean_failure() {
    let stack = stack().await;
    let universe = stack.world.universe.id;
    let mut router = router_with(&stack, vec![10, 10, 10, 10, 10, 10]);
    router.register_ability(stack.world.fire_burst.clone()).unwrap();

    // The hero has exactly one level 2 slot.
    let cast = Intent::CastSpell {
        ability: stack.world.fire_burst.id,
        targets: vec![stack.world.goblin.id],
    };
    let first = router
        .run_turn(universe, stack.world.hero.id, cast.clone(), Utc::now())
        .await
        .unwrap();
    assert!(first.skill_result.success);

    let second = router
        .run_turn(universe, stack.world.hero.id, cast, Utc::now())
        .await
        .unwrap();
    assert!(!second.skill_result.success);
    assert!(second
        .skill_result
        .reason
        .as_deref()
        .unwrap()
        .contains("spell slots"));
}
