// ABOUTME: Built-in capabilities agents can invoke from the command line tool
// ABOUTME: Small, side-effect free tools: current time, echo and dice

use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use roundtable_core::{Capability, CapabilityRegistry};
use serde::Deserialize;
use serde_json::{json, Value};

/// Registry with every built-in capability
pub fn builtin_capabilities() -> CapabilityRegistry {
    CapabilityRegistry::new()
        .register(ClockCapability)
        .register(EchoCapability)
        .register(DiceCapability)
}

/// Reports the current UTC time
pub struct ClockCapability;

#[async_trait]
impl Capability for ClockCapability {
    fn name(&self) -> &str {
        "clock"
    }

    fn description(&self) -> &str {
        "Get the current date and time in UTC"
    }

    async fn execute(&self, _params: Value) -> Result<Value> {
        Ok(json!({ "utc": chrono::Utc::now().to_rfc3339() }))
    }
}

/// Returns its params unchanged
pub struct EchoCapability;

#[async_trait]
impl Capability for EchoCapability {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Return the given params unchanged"
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        Ok(params)
    }
}

/// Rolls dice, optionally from a fixed seed
pub struct DiceCapability;

#[async_trait]
impl Capability for DiceCapability {
    fn name(&self) -> &str {
        "dice"
    }

    fn description(&self) -> &str {
        "Roll `count` dice with `sides` sides; pass `seed` for a repeatable roll"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "count": { "type": "integer", "minimum": 1, "maximum": 20 },
                "sides": { "type": "integer", "minimum": 2, "maximum": 1000 },
                "seed": { "type": "integer" }
            },
            "required": ["sides"]
        })
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        #[derive(Deserialize)]
        struct Params {
            #[serde(default = "one")]
            count: u32,
            sides: u32,
            #[serde(default)]
            seed: Option<u64>,
        }
        fn one() -> u32 {
            1
        }

        let params: Params =
            serde_json::from_value(params).context("dice expects {count?, sides, seed?}")?;
        if !(1..=20).contains(&params.count) {
            anyhow::bail!("count must be between 1 and 20, got {}", params.count);
        }
        if !(2..=1000).contains(&params.sides) {
            anyhow::bail!("sides must be between 2 and 1000, got {}", params.sides);
        }

        let mut rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let rolls: Vec<u32> = (0..params.count)
            .map(|_| rng.gen_range(1..=params.sides))
            .collect();
        let total: u32 = rolls.iter().sum();
        Ok(json!({ "rolls": rolls, "total": total }))
    }
}
