//! Demo world seeder.
//!
//! Builds a small, self-consistent starting world against any pair of
//! repositories: a root universe, a tavern with a cellar below it, a
//! hero with spell slots, a goblin, a longsword, and two registered
//! abilities. Used by the binary's smoke path and the end-to-end tests
//! in place of the packaged content (which is not part of the core).

use std::sync::Arc;

use chrono::Utc;
use ttasolo_domain::{
    Ability, AbilityScores, AbilitySource, ActionCost, CharacterStats, EffectDuration, Entity,
    EntityKind, ItemStats, LocationStats, LocationType, ModifierAmount, ModifierKind,
    PersonalityProfile, Relationship, RelationshipKind, ResourceMechanism, ResourcePool, Skill,
    SourceKind, Targeting, UnifiedAbility, Universe,
};

use crate::infrastructure::ports::{GraphRepo, RepoError, TruthRepo};

/// Everything the seeder created.
pub struct SeededWorld {
    pub universe: Universe,
    pub hero: Entity,
    pub goblin: Entity,
    pub tavern: Entity,
    pub cellar: Entity,
    pub longsword: Entity,
    pub bless: UnifiedAbility,
    pub fire_burst: UnifiedAbility,
}

/// Seed the demo world into both stores.
pub async fn seed_demo_world(
    truth: &Arc<dyn TruthRepo>,
    graph: &Arc<dyn GraphRepo>,
) -> Result<SeededWorld, RepoError> {
    let universe = Universe::root("main", "player", Utc::now());
    truth.save_universe(&universe).await?;
    graph.register_universe(&universe).await?;

    let mut tavern_stats = LocationStats::new(3, LocationType::Tavern)
        .map_err(|e| RepoError::constraint(e.to_string()))?;
    let cellar_stats = LocationStats::new(5, LocationType::Dungeon)
        .map_err(|e| RepoError::constraint(e.to_string()))?;

    let cellar = Entity::new(universe.id, "Flagon Cellar", EntityKind::Location(cellar_stats))
        .with_description("Low beams, old casks, and something scratching in the dark.");
    let cellar = truth.save_entity(&cellar).await?;
    graph.upsert_node(&cellar).await?;

    tavern_stats.exits.insert("down".into(), cellar.id);
    let tavern = Entity::new(universe.id, "The Gilded Flagon", EntityKind::Location(tavern_stats))
        .with_description("A crowded taproom that smells of woodsmoke and spilled ale.");
    let tavern = truth.save_entity(&tavern).await?;
    graph.upsert_node(&tavern).await?;

    let mut hero_stats = CharacterStats::new(
        3,
        28,
        16,
        AbilityScores::new(16, 12, 14, 10, 10, 12)
            .map_err(|e| RepoError::constraint(e.to_string()))?,
    )
    .map_err(|e| RepoError::constraint(e.to_string()))?;
    hero_stats.skill_proficiencies = vec![Skill::Athletics, Skill::Intimidation];
    hero_stats.save_proficiencies = vec![Ability::Str, Ability::Con];
    hero_stats.weapon_proficiencies = vec!["longsword".into()];
    hero_stats.resources = ResourcePool::empty().with_spell_slots(&[(1, 3), (2, 1)]);
    let hero = Entity::new(universe.id, "Aria Voss", EntityKind::Character(hero_stats))
        .with_description("A sellsword with a paladin's habits and a gambler's luck.");
    let hero = truth.save_entity(&hero).await?;
    graph.upsert_node(&hero).await?;

    let mut goblin_stats = CharacterStats::new(
        1,
        7,
        14,
        AbilityScores::new(8, 14, 10, 10, 8, 8)
            .map_err(|e| RepoError::constraint(e.to_string()))?,
    )
    .map_err(|e| RepoError::constraint(e.to_string()))?;
    goblin_stats.personality = Some(PersonalityProfile::new(30, 20, 40, 15, 80));
    goblin_stats.motivations = vec![ttasolo_domain::Motivation::Survival];
    let goblin = Entity::new(universe.id, "Cellar Goblin", EntityKind::Character(goblin_stats))
        .with_tags(vec!["npc".into()]);
    let goblin = truth.save_entity(&goblin).await?;
    graph.upsert_node(&goblin).await?;

    let longsword = Entity::new(
        universe.id,
        "longsword",
        EntityKind::Item(ItemStats::weapon(3.0, 15, "1d8", "slashing")),
    );
    let longsword = truth.save_entity(&longsword).await?;
    graph.upsert_node(&longsword).await?;

    for (from, to, kind) in [
        (hero.id, tavern.id, RelationshipKind::LocatedIn),
        (goblin.id, cellar.id, RelationshipKind::LocatedIn),
        (hero.id, longsword.id, RelationshipKind::Carries),
    ] {
        graph
            .create_relationship(&Relationship::new(universe.id, from, to, kind))
            .await?;
    }

    let bless = UnifiedAbility::new(
        "Bless",
        AbilitySource {
            kind: SourceKind::Magic,
            subtype: "enchantment".into(),
        },
        ResourceMechanism::Slots { level: 1 },
        Targeting::single(30),
        ActionCost::Action,
    )
    .with_modifier(
        "attack_roll",
        ModifierKind::Bonus,
        ModifierAmount::Dice("1d4".into()),
        EffectDuration::rounds(10),
    )
    .concentration();

    let fire_burst = UnifiedAbility::new(
        "Fire Burst",
        AbilitySource {
            kind: SourceKind::Magic,
            subtype: "evocation".into(),
        },
        ResourceMechanism::Slots { level: 2 },
        Targeting::area(ttasolo_domain::TargetMode::AreaSphere, 60, 10),
        ActionCost::Action,
    )
    .with_damage("3d6", "fire")
    .with_save_for_half(Ability::Dex, 13);

    Ok(SeededWorld {
        universe,
        hero,
        goblin,
        tavern,
        cellar,
        longsword,
        bless,
        fire_burst,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::memory::{InMemoryGraphRepo, InMemoryTruthRepo};

    #[tokio::test]
    async fn test_seeded_world_is_consistent() {
        let truth: Arc<dyn TruthRepo> = Arc::new(InMemoryTruthRepo::new());
        let graph: Arc<dyn GraphRepo> = Arc::new(InMemoryGraphRepo::new());
        let world = seed_demo_world(&truth, &graph).await.unwrap();

        // The hero stands in the tavern; the goblin lurks below.
        let in_tavern = graph
            .query_entities_at_location(world.universe.id, world.tavern.id)
            .await
            .unwrap();
        assert!(in_tavern.iter().any(|e| e.id == world.hero.id));
        let in_cellar = graph
            .query_entities_at_location(world.universe.id, world.cellar.id)
            .await
            .unwrap();
        assert!(in_cellar.iter().any(|e| e.id == world.goblin.id));

        // The tavern's down exit leads to the cellar.
        assert_eq!(
            world.tavern.as_location().unwrap().exits.get("down"),
            Some(&world.cellar.id)
        );

        // Abilities validate.
        world.bless.validate().unwrap();
        world.fire_burst.validate().unwrap();
    }
}
