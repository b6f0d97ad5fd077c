use std::process::ExitCode;

use clap::Parser;

use hrstrap::{Args, fake_sdk, real_sdk, run_with_log_level};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let mut stdout = std::io::stdout();

    let run_result = async {
        let log_level = args.log_level();
        let output_format = args.output_format();
        let (command, maybe_fake_args) = args.into_command_and_fake_args()?;
        let sdk = match maybe_fake_args {
            Some(fake_args) => fake_sdk(fake_args),
            None => real_sdk().await?,
        };

        run_with_log_level(command, &mut stdout, sdk, log_level, output_format).await
    }
    .await;

    match run_result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::from(1)
        }
    }
}
