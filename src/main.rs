//! Multi-node FTSP/GTSP/PulseSync demo and interactive shell.
//!
//! There is no real 6LoWPAN/802.15.4 stack here (see SPEC_FULL.md §1): this
//! binary simulates the MAC layer in-process with a simple broadcast bus so
//! the protocols can be exercised end to end without real hardware.

use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex, Weak};

use anyhow::Result;
use clap::Parser;
use clocksync::config::{self, SystemConfig};
use clocksync::frame_sink::FrameSink;
use clocksync::hardware_clock::SystemHardwareClock;
use clocksync::node::Node;

#[derive(Parser, Debug)]
#[command(name = "clocksync", about = "FTSP/GTSP/PulseSync sensor-network clock sync demo")]
struct Args {
    /// This node's network id (id 1 is the preferred FTSP/PulseSync root).
    #[arg(long, default_value_t = 1)]
    node_id: u16,

    /// Number of additional simulated peer nodes to run in-process alongside this one.
    #[arg(long, default_value_t = 3)]
    peers: u16,

    /// Optional JSON config file; falls back to built-in defaults if absent or invalid.
    #[arg(long)]
    config: Option<std::path::PathBuf>,
}

/// In-process stand-in for the 6LoWPAN broadcast MAC layer: delivers every
/// sent frame to every other registered node's `dispatch`.
struct Bus {
    nodes: Mutex<Vec<(u16, Weak<Node<SystemHardwareClock>>)>>,
}

impl Bus {
    fn new() -> Arc<Self> {
        Arc::new(Bus { nodes: Mutex::new(Vec::new()) })
    }

    fn register(&self, node_id: u16, node: &Arc<Node<SystemHardwareClock>>) {
        self.nodes.lock().unwrap().push((node_id, Arc::downgrade(node)));
    }
}

struct BusSink {
    node_id: u16,
    bus: Arc<Bus>,
}

impl FrameSink for BusSink {
    fn send_broadcast(&self, payload: &[u8]) -> Result<()> {
        for (id, weak) in self.bus.nodes.lock().unwrap().iter() {
            if *id == self.node_id {
                continue;
            }
            if let Some(node) = weak.upgrade() {
                let toa = node.clock.now();
                node.dispatch(payload, self.node_id, toa);
            }
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .format_timestamp(None)
        .format_target(false)
        .init();

    let args = Args::parse();
    let cfg: SystemConfig = config::load(args.config.as_deref());

    let bus = Bus::new();
    let mut nodes = Vec::new();

    for id in std::iter::once(args.node_id).chain((0..args.peers).map(|i| args.node_id + 1 + i)) {
        let sink: Arc<dyn FrameSink> = Arc::new(BusSink { node_id: id, bus: Arc::clone(&bus) });
        let node = Node::new(id, SystemHardwareClock::new(), sink, cfg.clone());
        bus.register(id, &node);
        node.ftsp.resume();
        node.gtsp.resume();
        node.pulsesync.resume();
        node.start();
        nodes.push(node);
    }

    log::info!("started {} simulated nodes; type 'help' for shell commands", nodes.len());

    let running = Arc::new(std::sync::atomic::AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || running.store(false, std::sync::atomic::Ordering::SeqCst))?;
    }

    let result = run_shell(&nodes, &running);
    for node in &nodes {
        node.shutdown();
    }
    result
}

fn run_shell(nodes: &[Arc<Node<SystemHardwareClock>>], running: &Arc<std::sync::atomic::AtomicBool>) -> Result<()> {
    let primary = &nodes[0];
    let stdin = io::stdin();
    print!("> ");
    io::stdout().flush().ok();

    for line in stdin.lock().lines() {
        if !running.load(std::sync::atomic::Ordering::SeqCst) {
            break;
        }
        let line = line?;
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            ["ftsp", "on"] => primary.ftsp.resume(),
            ["ftsp", "off"] => primary.ftsp.pause(),
            ["gtsp", "on"] => primary.gtsp.resume(),
            ["gtsp", "off"] => primary.gtsp.pause(),
            ["gtsp", "trigger", "add", addr] => {
                if let Ok(a) = addr.parse() {
                    primary.gtsp.add_trigger_address(a);
                }
            }
            ["gtsp", "trigger", "rm", addr] => {
                if let Ok(a) = addr.parse() {
                    primary.gtsp.remove_trigger_address(a);
                }
            }
            ["pulsesync", "on"] => primary.pulsesync.resume(),
            ["pulsesync", "off"] => primary.pulsesync.pause(),
            ["status"] => {
                println!("ftsp: {:?}", primary.ftsp_status.read().unwrap());
                println!("gtsp: {:?}", primary.gtsp_status.read().unwrap());
                println!("pulsesync: {:?}", primary.pulsesync_status.read().unwrap());
            }
            ["quit"] | ["exit"] => break,
            _ => {
                println!("usage: ftsp on|off | gtsp on|off|trigger [add|rm] <addr> | pulsesync on|off | status | quit");
            }
        }
        print!("> ");
        io::stdout().flush().ok();
    }
    Ok(())
}
