use treemirror_cli::format_error;

#[tokio::main]
async fn main() {
    if let Err(e) = treemirror_cli::run().await {
        eprintln!("{}", format_error(&e.to_string()));
        std::process::exit(1);
    }
}
