use crate::routes::{admin, ai, chat, document, health, image, meeting, sessions};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(info(
    title = "slab-master",
    description = "Master HTTP API: chat, document/image/meeting intake, session cache, GPU admin",
    version = "0.0.1",
    contact(name = "slab-rs", url = "https://github.com/Cyberhan123/slab.rs")
))]
pub struct ApiDoc;

pub fn get_docs() -> utoipa::openapi::OpenApi {
    let mut root = ApiDoc::openapi();
    root.merge(health::HealthApi::openapi());
    root.merge(chat::ChatApi::openapi());
    root.merge(sessions::SessionsApi::openapi());
    root.merge(document::DocumentApi::openapi());
    root.merge(image::ImageApi::openapi());
    root.merge(meeting::MeetingApi::openapi());
    root.merge(ai::AiApi::openapi());
    root.merge(admin::AdminApi::openapi());
    root
}
