use clap::{Parser, Subcommand};
use xsrf_guard::{
    cookie::build_cookie,
    token::{generate_token, XsrfToken, XSRF_TAG},
};

#[derive(Parser)]
#[command(name = "xsrf-guard-cli")]
#[command(about = "Mint and inspect anti-forgery tokens", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a freshly generated token
    Token,

    /// Print the Set-Cookie header that would carry a token
    Cookie {
        /// Token value (a new one is generated if omitted)
        #[arg(short, long)]
        value: Option<String>,

        /// Cookie lifetime in seconds, 0 for permanent
        #[arg(short, long, default_value_t = 0)]
        age: u64,
    },

    /// Print the hidden form field markup for a token
    Field {
        /// Token value (a new one is generated if omitted)
        #[arg(short, long)]
        value: Option<String>,
    },
}

fn token_or_new(value: Option<String>) -> XsrfToken {
    value.map(XsrfToken::new).unwrap_or_else(generate_token)
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Token => println!("{}", generate_token()),
        Commands::Cookie { value, age } => {
            let token = token_or_new(value);
            println!("Set-Cookie: {}", build_cookie(XSRF_TAG, token.into_inner(), age));
        }
        Commands::Field { value } => println!("{}", token_or_new(value).form_html()),
    }
}
