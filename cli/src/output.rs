/// Print a command result as the invocation's single JSON document.
pub fn print(value: serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(&value).expect("json encode"));
}
