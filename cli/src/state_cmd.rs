use bundlesync_core::BundleState;
use bundlesync_core::classify_state;
use clap::Parser;
use serde_json::json;

#[derive(Debug, Parser)]
pub struct StateArgs {
    /// Lifecycle state as reported by the backend (e.g. `running`)
    #[arg(value_name = "STATE")]
    pub state: String,

    /// Output as JSON for automation
    #[arg(long)]
    pub json: bool,
}

pub fn run_state(args: &StateArgs) -> anyhow::Result<()> {
    println!("{}", describe_state(&args.state, args.json)?);
    Ok(())
}

fn describe_state(raw: &str, as_json: bool) -> anyhow::Result<String> {
    let state = BundleState::from(raw);
    let class = classify_state(&state);
    let known = !matches!(state, BundleState::Other(_));

    if as_json {
        return Ok(serde_json::to_string(&json!({
            "state": state,
            "class": class.to_string(),
            "known": known,
        }))?);
    }

    let mut line = format!("{state}: {class}");
    if !known {
        line.push_str(" (unrecognized state)");
    }
    Ok(line)
}
