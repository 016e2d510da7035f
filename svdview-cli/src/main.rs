//! `svdview`: load an SVD file, read the peripherals from a target (or a mock)
//! and print the register tree.

use anyhow::{bail, Context as _, Result};
use clap::Parser;
use log::info;
use serde::Serialize;
use std::path::PathBuf;
use svdview_core::{
    DescriptionParser, LifecycleState, MockTransport, NodeId, PeripheralTree, RegisterTransport,
    SvdParser, TreeItem, ViewerConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// SVD file to load (overrides `svdPath` from the config)
    #[arg(short, long)]
    svd: Option<PathBuf>,

    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run in mock mode (no hardware required); registers read as their reset values
    #[arg(long)]
    mock: bool,

    /// Index of probe to use (default: 0)
    #[arg(long, default_value_t = 0)]
    probe_index: usize,

    /// Target chip name, auto-detected when omitted
    #[arg(long)]
    chip: Option<String>,

    /// Max byte gap between registers read in one block (overrides the config)
    #[arg(long)]
    gap: Option<u32>,

    /// Pin a peripheral by name (repeatable)
    #[arg(long)]
    pin: Vec<String>,

    /// Expand a peripheral by name, reading its registers (repeatable)
    #[arg(long)]
    expand: Vec<String>,

    /// Refresh every peripheral as if the target had just halted
    #[arg(long)]
    halt: bool,

    /// Print JSON instead of an indented tree
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Row {
    depth: usize,
    #[serde(flatten)]
    item: TreeItem,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ViewerConfig::load(path)?,
        None => ViewerConfig::default(),
    };
    if let Some(svd) = &args.svd {
        config.svd_path = Some(svd.clone());
    }
    if let Some(gap) = args.gap {
        config.addr_gap_threshold = gap;
    }

    let Some(svd_path) = config.svd_path.clone() else {
        bail!("No SVD file given (use --svd or svdPath in the config)");
    };
    let xml = SvdParser::load_svd(&svd_path)
        .with_context(|| format!("Cannot load {}", svd_path.display()))?;

    if args.mock {
        info!("Starting in MOCK mode. No hardware will be accessed.");
        let mock = MockTransport::new();
        seed_reset_values(&mock, &xml);
        run(&args, &config, &xml, mock).await
    } else {
        run_hardware(&args, &config, &xml).await
    }
}

#[cfg(feature = "hardware")]
async fn run_hardware(args: &Args, config: &ViewerConfig, xml: &str) -> Result<()> {
    let chip = args.chip.as_deref().or(config.device_name.as_deref());
    let transport = svdview_core::ProbeTransport::attach(args.probe_index, chip)?;
    run(args, config, xml, transport).await
}

#[cfg(not(feature = "hardware"))]
async fn run_hardware(_args: &Args, _config: &ViewerConfig, _xml: &str) -> Result<()> {
    bail!("Built without hardware support; use --mock")
}

/// Fill mock memory with every register's reset value.
fn seed_reset_values(mock: &MockTransport, xml: &str) {
    let Ok(peripherals) = SvdParser::parse_str(xml) else {
        return;
    };
    for p in peripherals {
        for r in p.registers {
            if let Some(reset) = r.reset_value {
                let bytes = reset.to_le_bytes();
                let len = (r.size_bytes() as usize).min(bytes.len());
                mock.poke(p.base_address + u64::from(r.address_offset), &bytes[..len]);
            }
        }
    }
}

async fn run<T>(args: &Args, config: &ViewerConfig, xml: &str, transport: T) -> Result<()>
where
    T: RegisterTransport,
{
    let mut tree =
        PeripheralTree::new(SvdParser::new(), transport).with_addr_gap(config.addr_gap_threshold);

    tree.session_started(Some(xml)).await;
    if let LifecycleState::Failed { message } = tree.lifecycle() {
        bail!("{message}");
    }
    info!("{} peripherals loaded", tree.children(None).len());

    pin_all(&mut tree, &args.pin)?;
    if args.halt {
        tree.session_stopped().await;
    }
    for name in &args.expand {
        let id = find_peripheral(&tree, name)?;
        tree.on_expand(id).await;
    }

    let mut rows = Vec::new();
    collect_rows(&tree, None, 0, &mut rows);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for row in rows {
            let indent = "  ".repeat(row.depth);
            match &row.item.detail {
                Some(detail) => println!("{indent}{} = {detail}", row.item.label),
                None => println!("{indent}{}", row.item.label),
            }
        }
    }

    tree.session_terminated();
    Ok(())
}

/// Pin every named peripheral. `toggle_pin` flips, so names already pinned are skipped.
fn pin_all<P, T>(tree: &mut PeripheralTree<P, T>, names: &[String]) -> Result<()>
where
    P: DescriptionParser,
    T: RegisterTransport,
{
    for name in names {
        let id = find_peripheral(tree, name)?;
        if !tree.collection().arena().is_pinned(id) {
            tree.toggle_pin(id);
        }
    }
    Ok(())
}

fn find_peripheral<P, T>(tree: &PeripheralTree<P, T>, name: &str) -> Result<NodeId>
where
    P: DescriptionParser,
    T: RegisterTransport,
{
    tree.children(None)
        .into_iter()
        .find(|&id| {
            tree.collection()
                .arena()
                .get(id)
                .is_some_and(|n| n.name == name)
        })
        .with_context(|| format!("Peripheral {name} not found"))
}

/// Walk the visible part of the tree: children of expanded nodes only.
fn collect_rows<T: RegisterTransport>(
    tree: &PeripheralTree<SvdParser, T>,
    node: Option<NodeId>,
    depth: usize,
    rows: &mut Vec<Row>,
) {
    for child in tree.children(node) {
        let Some(item) = tree.tree_item(child) else {
            continue;
        };
        let expanded = tree
            .collection()
            .arena()
            .get(child)
            .is_some_and(|n| n.expanded);
        rows.push(Row { depth, item });
        if expanded {
            collect_rows(tree, Some(child), depth + 1, rows);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINI: &str = include_str!("../../svdview-core/tests/fixtures/mini.svd");

    fn pinned_names(tree: &PeripheralTree<SvdParser, MockTransport>) -> Vec<String> {
        let arena = tree.collection().arena();
        tree.children(None)
            .into_iter()
            .filter(|&id| arena.is_pinned(id))
            .map(|id| arena.get(id).unwrap().name.clone())
            .collect()
    }

    #[tokio::test]
    async fn test_repeated_pin_names_pin_once() {
        let mut tree = PeripheralTree::new(SvdParser::new(), MockTransport::new());
        tree.session_started(Some(MINI)).await;

        let names = vec!["TIMER1".to_string(), "TIMER1".to_string()];
        pin_all(&mut tree, &names).unwrap();
        assert_eq!(pinned_names(&tree), ["TIMER1"]);

        pin_all(&mut tree, &["TIMER1".to_string()]).unwrap();
        assert_eq!(pinned_names(&tree), ["TIMER1"]);
        assert!(pin_all(&mut tree, &["NOPE".to_string()]).is_err());
    }
}
