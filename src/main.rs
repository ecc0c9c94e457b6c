use clap::Parser;
use lc3vm::{run_built_in_test_suite, terminal::TerminalGuard, Cli, VmError};
use log::error;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_sigint(_: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    if cli.test {
        process::exit(if run_built_in_test_suite() { 0 } else { 1 });
    }

    if cli.images.is_empty() {
        eprintln!("usage: lc3vm <image>...");
        process::exit(2);
    }

    install_sigint_handler();

    let _terminal = match TerminalGuard::enable_raw_mode() {
        Ok(guard) => guard,
        Err(err) => {
            error!("failed to set terminal to raw mode: {}", err);
            process::exit(1);
        }
    };

    let mut vm = lc3vm::Vm::new();

    for image in &cli.images {
        if let Err(err) = vm.load_image(image) {
            error!("{}", err);
            process::exit(1);
        }
    }

    match vm.run_with_interrupt_flag(&INTERRUPTED) {
        Ok(()) => process::exit(0),
        Err(VmError::Interrupted) => process::exit(-2),
        Err(err) => {
            error!("{}", err);
            process::exit(1);
        }
    }
}

fn install_sigint_handler() {
    let action = SigAction::new(
        SigHandler::Handler(handle_sigint),
        SaFlags::empty(),
        SigSet::empty(),
    );
    unsafe {
        signal::sigaction(Signal::SIGINT, &action).expect("failed to install SIGINT handler");
    }
}
