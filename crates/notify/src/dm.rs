//! Direct-message copy sent around a delivery. Kept as plain text
//! builders so the evaluator stays free of formatting concerns.

/// Sent when a user crossed a threshold but has no email on their
/// profile. The claim is held until they add one.
pub fn email_missing_prompt(total_reactions: u32) -> String {
    format!(
        "🎉 Congratulations! Your message got {total_reactions} reactions and earned \
         you a POAP! However, we need your email address to send it to you. Please \
         add an email to your Slack profile, or reply here with your email address."
    )
}

/// Sent after the claim email went out, pointing the recipient at
/// their inbox.
pub fn delivery_congratulations(
    recipient_name: &str,
    channel_name: &str,
    total_reactions: u32,
    email: &str,
) -> String {
    format!(
        "🎉 Congratulations {recipient_name}! Your message in #{channel_name} got \
         {total_reactions} reactions and earned you a POAP! Check your email \
         ({email}) for the claim link."
    )
}
