//! Centralized defaults and tuning constants for the progression engine.
//!
//! Configuration documents override these; an empty document falls back to
//! exactly these values.

// Leveling -----------------------------------------------------------------
pub(crate) const DEFAULT_BASE_EXP: f64 = 100.0;
pub(crate) const DEFAULT_LEVEL_MULTIPLIER: f64 = 1.2;
pub(crate) const DEFAULT_MAX_LEVEL: u32 = 100;

// Anti-exploit -------------------------------------------------------------
pub(crate) const DEFAULT_NATURAL_TIME_MILLIS: u64 = 30 * 60 * 1_000;
pub(crate) const DEFAULT_SWEEP_INTERVAL_MILLIS: u64 = 10 * 60 * 1_000;

/// Resource kinds whose placements are tracked unless configuration says otherwise.
pub(crate) const DEFAULT_TRACKED_TARGETS: &[&str] = &[
    // Logs and stems
    "OAK_LOG",
    "BIRCH_LOG",
    "SPRUCE_LOG",
    "JUNGLE_LOG",
    "ACACIA_LOG",
    "DARK_OAK_LOG",
    "MANGROVE_LOG",
    "CHERRY_LOG",
    "CRIMSON_STEM",
    "WARPED_STEM",
    // Ores
    "COAL_ORE",
    "IRON_ORE",
    "GOLD_ORE",
    "DIAMOND_ORE",
    "EMERALD_ORE",
    "LAPIS_ORE",
    "REDSTONE_ORE",
    "COPPER_ORE",
    "DEEPSLATE_COAL_ORE",
    "DEEPSLATE_IRON_ORE",
    "DEEPSLATE_GOLD_ORE",
    "DEEPSLATE_DIAMOND_ORE",
    "DEEPSLATE_EMERALD_ORE",
    "DEEPSLATE_LAPIS_ORE",
    "DEEPSLATE_REDSTONE_ORE",
    "DEEPSLATE_COPPER_ORE",
    // Crops
    "WHEAT",
    "CARROTS",
    "POTATOES",
    "BEETROOTS",
    "PUMPKIN",
    "MELON",
    "SUGAR_CANE",
    "BAMBOO",
    "COCOA",
    "SWEET_BERRY_BUSH",
    // Building blocks
    "COBBLESTONE",
    "STONE_BRICKS",
    "SMOOTH_STONE",
    "BRICKS",
    "NETHER_BRICKS",
    "QUARTZ_BLOCK",
    "PRISMARINE",
    "PRISMARINE_BRICKS",
    "DARK_PRISMARINE",
];

// Salary -------------------------------------------------------------------
pub(crate) const DEFAULT_PAYOUT_INTERVAL_MINUTES: u64 = 5;
pub(crate) const MILLIS_PER_MINUTE: u64 = 60 * 1_000;

// Notifications ------------------------------------------------------------
pub(crate) const DEFAULT_ACCUMULATION_MILLIS: u64 = 2_000;
pub(crate) const DEFAULT_DISPLAY_MILLIS: u64 = 3_000;
pub(crate) const DEFAULT_CURRENCY_SYMBOL: &str = "$";

// Membership ---------------------------------------------------------------
pub(crate) const DEFAULT_MAX_ROLES: usize = 3;
pub(crate) const DEFAULT_CHANCE_PERCENT: f64 = 100.0;

/// Placeholder substituted with the subject id in level-reward commands.
pub const SUBJECT_PLACEHOLDER: &str = "{subject}";
