use easel_core::payload::fields;
use easel_core::{
    build_generation_payload, Credential, GenerationRequest, JobId, JobRequestBody, LoraEntry,
    UpscaleSettings,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn request() -> GenerationRequest {
    GenerationRequest {
        model: "748070388543653861".to_string(),
        prompt: "a red fox".to_string(),
        negative_prompt: "blurry".to_string(),
        width: 768,
        height: 1024,
        count: 2,
        steps: 28,
        cfg_scale: 6.5,
        seed: 1234,
        sampler: "DPM++ 2M".to_string(),
        vae: String::new(),
        clip_skip: 2,
        ..GenerationRequest::default()
    }
    .with_credential(Credential::new("jjdd-0123456789abcdef"))
}

#[test]
fn generation_payload_uses_backend_field_names() {
    let body = Value::Object(build_generation_payload(&request(), ""));
    assert_eq!(
        body,
        json!({
            "jjddApiKey": "jjdd-0123456789abcdef",
            "seed": 1234,
            "count": 2,
            "width": 768,
            "height": 1024,
            "正提示词": "a red fox",
            "负提示词": "blurry",
            "sdModel": "748070388543653861",
            "sdVae": "ae.sft",
            "sampler": "DPM++ 2M",
            "steps": 28,
            "cfgScale": 6.5,
            "clipSkip": 2
        })
    );
}

#[test]
fn extra_text_is_appended_to_positive_prompt() {
    let body = build_generation_payload(&request(), "  wearing a scarf ");
    assert_eq!(
        body[fields::POSITIVE_PROMPT],
        json!("a red fox, wearing a scarf")
    );
}

#[test]
fn non_ascii_field_names_survive_serialization() {
    let body = build_generation_payload(&request(), "");
    let text = serde_json::to_string(&body).unwrap();
    assert!(text.contains("\"正提示词\":\"a red fox\""));
    assert!(text.contains("\"负提示词\":\"blurry\""));
}

#[test]
fn blank_loras_are_skipped_and_rest_numbered() {
    let mut request = request();
    request.loras = vec![
        LoraEntry::new("  ", 1.0),
        LoraEntry::new("https://tensor.art/models/555/style", 0.6),
        LoraEntry::new("777", f32::NAN),
    ];
    let body = build_generation_payload(&request, "");

    assert_eq!(body["loraModel1"], json!("555"));
    assert_eq!(body["weight1"].as_f64().unwrap(), f64::from(0.6_f32));
    assert_eq!(body["loraModel2"], json!("777"));
    assert_eq!(body["weight2"].as_f64().unwrap(), f64::from(0.8_f32));
    assert!(!body.contains_key("loraModel3"));
}

#[test]
fn upscale_block_is_only_sent_when_enabled() {
    let body = build_generation_payload(&request(), "");
    assert!(!body.contains_key(fields::UPSCALE_SWITCH));

    let mut request = request();
    request.upscale = Some(UpscaleSettings::default());
    let body = build_generation_payload(&request, "");
    assert_eq!(body[fields::UPSCALE_SWITCH], json!(true));
    assert_eq!(body[fields::UPSCALE_MODEL], json!("4x-UltraSharp"));
    assert_eq!(body[fields::UPSCALE_RESIZE_X], json!(1024));
    assert_eq!(body[fields::UPSCALE_STEPS], json!(20));
}

#[test]
fn batch_count_is_clamped() {
    let mut request = request();
    request.count = 50;
    assert_eq!(build_generation_payload(&request, "")[fields::COUNT], json!(20));
    request.count = 0;
    assert_eq!(build_generation_payload(&request, "")[fields::COUNT], json!(1));
}

#[test]
fn job_body_carries_id_and_credential() {
    let job_id = JobId::from("abc");
    let credential = Credential::new("jjdd-0123456789abcdef");
    let body = serde_json::to_value(JobRequestBody::new(&job_id, &credential)).unwrap();
    assert_eq!(
        body,
        json!({"job_id": "abc", "jjddApiKey": "jjdd-0123456789abcdef"})
    );
}
