#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    studio_slots::run().await
}
