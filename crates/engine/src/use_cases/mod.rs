//! Use cases: the rule services and the turn router.

pub mod effects;
pub mod moves;
pub mod multiverse;
pub mod npc;
pub mod quests;
pub mod resources;
pub mod router;
pub mod skills;

pub use effects::{AbilityApplication, ConcentrationCheck, EffectPipeline, TickReport};
pub use moves::{MoveContext, MoveExecutor, MovePrompts, MoveResult};
pub use multiverse::{ForkResult, MultiverseService, TravelResult};
pub use npc::{Decision, DecisionContext, NpcAction, NpcDecisionService};
pub use quests::QuestService;
pub use resources::{
    DefyOutcome, FrayHit, HeroicCost, ResourceDebit, ResourceService, SoloRoundReport,
};
pub use router::{Intent, SkillResult, TurnContext, TurnResult, TurnRouter};
pub use skills::{AttackResult, CheckResult, SkillService};
