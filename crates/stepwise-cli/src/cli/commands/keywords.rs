use stepwise_core::KeywordRegistry;

use super::super::args::KeywordsArgs;
use crate::exit_codes;

pub fn run(args: KeywordsArgs) -> anyhow::Result<i32> {
    let registry = KeywordRegistry::with_builtins();
    let signatures = registry.signatures();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&signatures)?);
    } else {
        for signature in &signatures {
            let params = signature.params.join(", ");
            match &signature.description {
                Some(description) => println!("{}({})  {}", signature.name, params, description),
                None => println!("{}({})", signature.name, params),
            }
        }
    }
    Ok(exit_codes::SUCCESS)
}
