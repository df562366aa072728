//! Prompt construction for the two assistant operations.

use std::fmt::Write as _;

use crate::{
    image::ValidatedImage,
    wire::{ChatMessage, ChatRequest, Content, ContentPart, ImageUrl, ResponseFormat},
    ClientOptions, InputRejection, Message, Role, UserProfile,
};

const PERSONA: &str = "Você é a Nutri, uma assistente virtual de nutrição e condicionamento físico. \
Responda sempre em português do Brasil, de forma acolhedora, objetiva e prática. \
Baseie suas orientações em evidências, adapte-as ao perfil do usuário e nunca substitua \
o acompanhamento de um nutricionista ou médico. Se a pergunta fugir de alimentação, \
exercícios ou bem-estar, redirecione gentilmente a conversa.";

const VISION_INSTRUCTIONS: &str = "Analise a foto desta refeição e identifique os alimentos visíveis. \
Responda somente com um objeto JSON no formato \
{\"ingredients\": [\"alimento\"], \"confidence\": 0.0, \"preparation\": [\"modo de preparo\"]}. \
Use nomes de alimentos em português, \"confidence\" entre 0 e 1 refletindo sua certeza geral \
e deixe \"preparation\" vazio se não for possível inferir o preparo.";

/// Renders the profile as a context block for the system prompt.
pub(crate) fn profile_context(profile: &UserProfile) -> String {
    let mut context = String::new();
    if let Some(name) = profile.name.as_deref().filter(|name| !name.trim().is_empty()) {
        let _ = writeln!(context, "- Nome: {}", name.trim());
    }
    if let Some(age) = profile.age {
        let _ = writeln!(context, "- Idade: {age} anos");
    }
    if let Some(weight) = profile.weight_kg {
        let _ = writeln!(context, "- Peso: {weight:.1} kg");
    }
    if let Some(height) = profile.height_cm {
        let _ = writeln!(context, "- Altura: {height:.0} cm");
    }
    if let (Some(weight), Some(height)) = (profile.weight_kg, profile.height_cm) {
        if height > 0.0 {
            let meters = height / 100.0;
            let _ = writeln!(context, "- IMC: {:.1}", weight / (meters * meters));
        }
    }
    if let Some(goal) = profile.goal.as_deref().filter(|goal| !goal.trim().is_empty()) {
        let _ = writeln!(context, "- Objetivo: {}", goal.trim());
    }
    if let Some(level) = profile
        .activity_level
        .as_deref()
        .filter(|level| !level.trim().is_empty())
    {
        let _ = writeln!(context, "- Nível de atividade: {}", level.trim());
    }
    let restrictions: Vec<&str> = profile
        .dietary_restrictions
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .collect();
    if !restrictions.is_empty() {
        let _ = writeln!(context, "- Restrições alimentares: {}", restrictions.join(", "));
    }
    context
}

pub(crate) fn build_chat_request(
    messages: &[Message],
    profile: &UserProfile,
    opts: &ClientOptions,
) -> Result<ChatRequest, InputRejection> {
    let history: Vec<&Message> = messages
        .iter()
        .filter(|message| !message.content.trim().is_empty())
        .collect();
    if history.is_empty() {
        return Err(InputRejection::EmptyConversation);
    }
    let keep = opts.max_history_messages.max(1);
    let history = &history[history.len().saturating_sub(keep)..];

    let mut system = PERSONA.to_owned();
    let context = profile_context(profile);
    if !context.is_empty() {
        system.push_str("\n\nPerfil do usuário:\n");
        system.push_str(&context);
    }

    let mut wire_messages = Vec::with_capacity(history.len() + 1);
    wire_messages.push(ChatMessage {
        role: "system",
        content: Content::Text(system),
    });
    wire_messages.extend(history.iter().map(|message| ChatMessage {
        role: match message.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        },
        content: Content::Text(message.content.trim().to_owned()),
    }));

    Ok(ChatRequest {
        model: opts.chat_model.clone(),
        messages: wire_messages,
        temperature: opts.chat_temperature,
        max_tokens: opts.chat_max_tokens,
        response_format: None,
    })
}

pub(crate) fn build_vision_request(image: &ValidatedImage, opts: &ClientOptions) -> ChatRequest {
    ChatRequest {
        model: opts.vision_model.clone(),
        messages: vec![ChatMessage {
            role: "user",
            content: Content::Parts(vec![
                ContentPart::Text {
                    text: VISION_INSTRUCTIONS.to_owned(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image.data_uri(),
                        detail: "high",
                    },
                },
            ]),
        }],
        temperature: opts.vision_temperature,
        max_tokens: opts.vision_max_tokens,
        response_format: Some(ResponseFormat {
            kind: "json_object",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{build_chat_request, profile_context};
    use crate::{wire::Content, ClientOptions, InputRejection, Message, UserProfile};

    fn profile() -> UserProfile {
        UserProfile {
            name: Some("Ana".to_owned()),
            age: Some(31),
            weight_kg: Some(64.0),
            height_cm: Some(160.0),
            goal: Some("perder peso".to_owned()),
            activity_level: None,
            dietary_restrictions: vec!["lactose".to_owned(), " ".to_owned()],
        }
    }

    #[test]
    fn context_lists_known_fields_only() {
        let context = profile_context(&profile());
        assert!(context.contains("Nome: Ana"));
        assert!(context.contains("Idade: 31 anos"));
        assert!(context.contains("IMC: 25.0"));
        assert!(context.contains("Restrições alimentares: lactose\n"));
        assert!(!context.contains("Nível de atividade"));
        assert!(profile_context(&UserProfile::default()).is_empty());
    }

    #[test]
    fn system_prompt_comes_first_and_embeds_profile() {
        let request = build_chat_request(
            &[Message::user("Posso comer pão à noite?")],
            &profile(),
            &ClientOptions::default(),
        )
        .expect("request must build");

        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, "system");
        match &request.messages[0].content {
            Content::Text(text) => {
                assert!(text.contains("Nutri"));
                assert!(text.contains("Objetivo: perder peso"));
            }
            Content::Parts(_) => panic!("system prompt must be plain text"),
        }
        assert_eq!(request.messages[1].role, "user");
        assert!(request.response_format.is_none());
    }

    #[test]
    fn history_is_trimmed_to_most_recent() {
        let opts = ClientOptions {
            max_history_messages: 2,
            ..ClientOptions::default()
        };
        let messages = [
            Message::user("um"),
            Message::assistant("dois"),
            Message::user("três"),
        ];
        let request =
            build_chat_request(&messages, &UserProfile::default(), &opts).expect("must build");
        assert_eq!(request.messages.len(), 3);
        assert_eq!(request.messages[1].role, "assistant");
        match &request.messages[2].content {
            Content::Text(text) => assert_eq!(text, "três"),
            Content::Parts(_) => panic!("expected text"),
        }
    }

    #[test]
    fn blank_conversation_is_rejected() {
        let err = build_chat_request(
            &[Message::user("  ")],
            &UserProfile::default(),
            &ClientOptions::default(),
        )
        .expect_err("blank conversation must fail");
        assert_eq!(err, InputRejection::EmptyConversation);
    }
}
