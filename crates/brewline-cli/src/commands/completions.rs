use super::EXIT_SUCCESS;
use clap::CommandFactory;
use clap_complete::Shell;
use std::io::Write;

pub fn generate<C: CommandFactory>(shell: Shell, out: &mut impl Write) {
    clap_complete::generate(shell, &mut C::command(), "brewline", out);
}

#[allow(clippy::unnecessary_wraps)]
pub fn run<C: CommandFactory>(shell: Shell) -> Result<u8, String> {
    generate::<C>(shell, &mut std::io::stdout());
    Ok(EXIT_SUCCESS)
}
