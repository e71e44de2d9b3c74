// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! `repctl`: diagnostic dump/monitor utility for the devlink-port
//! interface.
//!
//! `repctl dump` prints every devlink port and device-info record the
//! kernel knows about; `repctl monitor` joins the devlink `config`
//! multicast group and prints port notifications as they arrive.

use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use devlink::{DevlinkClient, DevlinkInfo, DevlinkMonitor, DevlinkPort, PortEvent};

#[derive(Parser)]
#[command(name = "repctl")]
#[command(about = "Dump and monitor devlink representor ports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Dump all devlink ports and device information, then exit.
    Dump,
    /// Print devlink port notifications until interrupted.
    Monitor,
}

fn print_port(port: &DevlinkPort) {
    println!("bus_name: '{}'", port.bus_name);
    println!("dev_name: '{}'", port.dev_name);
    println!("index: {}", port.index);
    match port.port_type {
        Some(port_type) => println!("type: {port_type}"),
        None => println!("type: not present"),
    }
    match port.netdev_ifindex {
        Some(ifindex) => println!("netdev_ifindex: {ifindex}"),
        None => println!("netdev_ifindex: not present"),
    }
    println!(
        "netdev_name: '{}'",
        port.netdev_name.as_deref().unwrap_or("")
    );
    println!("ibdev_name: '{}'", port.ibdev_name.as_deref().unwrap_or(""));
    match port.flavour {
        Some(flavour) => println!("flavour: {flavour}"),
        None => println!("flavour: not present"),
    }
    match port.number {
        Some(number) => println!("number: {number}"),
        None => println!("number: not present"),
    }
    match port.pci_pf_number {
        Some(pf) => println!("pci_pf_number: {pf}"),
        None => println!("pci_pf_number: not present"),
    }
    match port.pci_vf_number {
        Some(vf) => println!("pci_vf_number: {vf}"),
        None => println!("pci_vf_number: not present"),
    }
    match port.pci_sf_number {
        Some(sf) => println!("pci_sf_number: {sf}"),
        None => println!("pci_sf_number: not present"),
    }
    match port.hw_addr {
        Some(mac) => println!("function eth_addr: {mac}"),
        None => println!("function eth_addr: not present"),
    }
    match port.fn_state {
        Some(state) => println!("function state: {state}"),
        None => println!("function state: not present"),
    }
    match port.fn_opstate {
        Some(opstate) => println!("function opstate: {opstate}"),
        None => println!("function opstate: not present"),
    }
    println!();
}

fn print_info(info: &DevlinkInfo) {
    println!(
        "device: {}/{}",
        info.bus_name.as_deref().unwrap_or(""),
        info.dev_name.as_deref().unwrap_or("")
    );
    println!("driver_name: '{}'", info.driver_name);
    println!(
        "serial_number: '{}'",
        info.serial_number.as_deref().unwrap_or("")
    );
    println!(
        "board_serial_number: '{}'",
        info.board_serial_number.as_deref().unwrap_or("")
    );
    for version in &info.versions_fixed {
        println!("fixed {}: {}", version.name, version.value);
    }
    for version in &info.versions_running {
        println!("running {}: {}", version.name, version.value);
    }
    for version in &info.versions_stored {
        println!("stored {}: {}", version.name, version.value);
    }
    println!();
}

fn dump() -> anyhow::Result<()> {
    let client = DevlinkClient::new().context("unable to reach the devlink family")?;

    println!("port dump");
    for port in client.dump_ports().context("port dump failed")? {
        print_port(&port);
    }

    println!("info dump");
    for info in client.dump_info().context("info dump failed")? {
        print_info(&info);
    }
    Ok(())
}

fn monitor() -> anyhow::Result<()> {
    let mut monitor =
        DevlinkMonitor::new().context("unable to join the devlink config multicast group")?;
    loop {
        while let Some(event) = monitor.try_next() {
            match event {
                PortEvent::New(port) => {
                    println!("DEVLINK_CMD_PORT_NEW");
                    print_port(&port);
                }
                PortEvent::Del(port) => {
                    println!("DEVLINK_CMD_PORT_DEL");
                    print_port(&port);
                }
            }
        }
        thread::sleep(Duration::from_millis(100));
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Dump => dump(),
        Command::Monitor => monitor(),
    }
}
