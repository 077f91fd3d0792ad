use isvc_ingress::crd::inference_service::InferenceService;
use kube::CustomResourceExt;
use serde_json::{json, Value};

fn main() -> anyhow::Result<()> {
    // Prints the InferenceService CRD subset this controller reads, for test clusters.
    // Use: cargo run --bin gen-crd | python3 -c "import sys,json,yaml; print(yaml.dump(json.load(sys.stdin), default_flow_style=False))"

    let mut crd: Value = serde_json::to_value(InferenceService::crd())?;

    // Other controllers own most of the schema; keep unknown fields
    if let Some(versions) = crd["spec"]["versions"].as_array_mut() {
        for version in versions {
            version["schema"]["openAPIV3Schema"]["x-kubernetes-preserve-unknown-fields"] =
                json!(true);
        }
    }

    println!("{}", serde_json::to_string_pretty(&crd)?);
    Ok(())
}
