use cutdesk_lib::commands::{CommandError, USAGE};

#[tokio::main]
async fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match cutdesk_lib::run(args).await {
        Ok(output) => println!("{}", output),
        Err(CommandError::Usage(message)) => {
            eprintln!("{}\n\n{}", message, USAGE);
            std::process::exit(2);
        }
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    }
}
