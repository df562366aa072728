use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use dietai_http::{DietAiClient, Message, UserProfile};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let client = DietAiClient::from_env().map_err(anyhow::Error::msg)?;

    let profile = UserProfile {
        name: Some("Kit".to_owned()),
        age: Some(29),
        weight_kg: Some(72.5),
        height_cm: Some(178.0),
        goal: Some("melhorar o condicionamento".to_owned()),
        activity_level: Some("moderado".to_owned()),
        dietary_restrictions: vec!["glúten".to_owned()],
    };

    let reply = client
        .chat_completion(
            &[Message::user("Sugira um café da manhã rico em proteínas.")],
            &profile,
        )
        .await?;
    println!("{reply}");

    if let Some(path) = std::env::args().nth(1) {
        let bytes = std::fs::read(&path)?;
        let mime = if path.to_ascii_lowercase().ends_with(".png") {
            "image/png"
        } else {
            "image/jpeg"
        };
        let data_uri = format!("data:{mime};base64,{}", BASE64.encode(bytes));

        match client.analyze_image(&data_uri).await {
            Ok(analysis) => println!("{analysis:?}"),
            Err(err) => println!("{err}"),
        }
    }

    println!("{:?}", client.stats());
    Ok(())
}
