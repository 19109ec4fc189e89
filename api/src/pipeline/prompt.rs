//! Builds the single user message sent to the generation provider for one review

use crate::constants::ANONYMOUS_AUTHOR_NAMES;
use crate::models::RecommendationHint;

/// Everything the draft generator knows about one review
#[derive(Debug, Clone, Default)]
pub struct DraftRequest {
    /// Account-level template. `{product}` and `{rating}` are substituted.
    pub prompt_template: String,
    pub body_text: String,
    pub rating: i32,
    pub product_name: Option<String>,
    pub attachment_count: usize,
    pub has_video: bool,
    pub author_name: String,
    pub is_empty: bool,
    pub recommendations: Vec<RecommendationHint>,
    pub is_refusal: bool,
    pub brand_name: Option<String>,
}

impl DraftRequest {
    pub fn has_images(&self) -> bool {
        let photos = self.attachment_count - usize::from(self.has_video && self.attachment_count > 0);
        photos > 0
    }
}

fn is_anonymous(author_name: &str) -> bool {
    let name = author_name.trim().to_lowercase();
    ANONYMOUS_AUTHOR_NAMES.contains(&name.as_str())
}

fn empty_review_tone(rating: i32) -> &'static str {
    match rating {
        4..=5 => {
            "The customer left a rating without any text. Reply in one or two short sentences of \
             gratitude. Do not invent details about their experience."
        }
        1..=2 => {
            "The customer left a low rating without any text. Reply in at most three short \
             sentences: apologise that the product did not meet expectations and invite them to \
             contact support so the issue can be resolved."
        }
        _ => {
            "The customer left a neutral rating without any text. Reply in one or two short, \
             neutral sentences thanking them for the rating."
        }
    }
}

/// Layers, in order: refusal warning, brand, review content, attachments,
/// author address, recommendations, empty-review tone.
pub fn build_user_message(req: &DraftRequest) -> String {
    let product = req.product_name.as_deref().unwrap_or("the product");
    let mut sections: Vec<String> = Vec::new();

    let template = req.prompt_template.trim();
    if !template.is_empty() {
        sections.push(
            template
                .replace("{product}", product)
                .replace("{rating}", &req.rating.to_string()),
        );
    }

    if req.is_refusal {
        sections.push(
            "IMPORTANT: the customer refused or returned this item. Do not thank them for the \
             purchase."
                .to_string(),
        );
    }

    if let Some(brand) = req.brand_name.as_deref().filter(|b| !b.trim().is_empty()) {
        sections.push(format!("Reply on behalf of the brand \"{}\".", brand.trim()));
    }

    let content = if req.is_empty || req.body_text.trim().is_empty() {
        "(no text; the customer left only a rating)".to_string()
    } else {
        req.body_text.trim().to_string()
    };
    sections.push(format!(
        "Review of \"{}\", rating {}/5:\n{}",
        product, req.rating, content
    ));

    if req.attachment_count > 0 {
        let note = if req.has_video {
            format!(
                "The customer attached {} media file(s), including a video. Thank them for the visual feedback.",
                req.attachment_count
            )
        } else {
            format!(
                "The customer attached {} photo(s). Thank them for the visual feedback.",
                req.attachment_count
            )
        };
        sections.push(note);
    }

    if !is_anonymous(&req.author_name) {
        sections.push(format!(
            "Address the customer by name: {}.",
            req.author_name.trim()
        ));
    }

    if !req.recommendations.is_empty() {
        let names: Vec<String> = req
            .recommendations
            .iter()
            .map(|h| format!("\"{}\" (article {})", h.target_name, h.target_id))
            .collect();
        sections.push(format!(
            "Naturally recommend one of these related products: {}.",
            names.join(", ")
        ));
    }

    if req.is_empty {
        sections.push(empty_review_tone(req.rating).to_string());
    }

    sections.join("\n\n")
}
