//! Conversation resolution for inbound messages.
//!
//! Every webhook invocation runs the same pipeline: normalize the sender's
//! number, resolve it to a member, find the one existing conversation the
//! message belongs to (or create one), then record the message and refresh
//! the conversation's recency marker.

use std::collections::HashSet;

use anyhow::Result;
use tracing::{debug, error, info, warn};

use crate::config::SmsConfig;
use crate::phone::{self, PhoneForms};
use crate::store::members::Member;
use crate::store::messages::NewMessage;
use crate::store::{now_rfc3339, Store};

/// Inbound message fields as received from the provider webhook.
#[derive(Debug, Clone)]
pub struct InboundSms {
    pub from: String,
    pub to: String,
    pub body: String,
    pub provider_sid: String,
}

/// Outcome of one webhook invocation.
#[derive(Debug)]
pub struct Resolution {
    pub message_id: String,
    pub conversation_id: Option<String>,
    pub member_id: Option<String>,
}

/// Which search strategy produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CandidateSource {
    Group,
    MultiRecipient,
    Direct,
}

#[derive(Debug, Clone)]
struct Candidate {
    conversation_id: String,
    created_at: String,
    source: CandidateSource,
}

/// Process one inbound message end to end. Only the final message insert is
/// fatal; lookup and provisioning failures degrade to phone-only resolution
/// and a null conversation reference respectively.
pub async fn handle_inbound(
    store: &Store,
    config: &SmsConfig,
    sms: &InboundSms,
) -> Result<Resolution> {
    let forms = phone::normalize(&sms.from);

    let member = match resolve_member(store, &sms.from, &forms).await {
        Ok(member) => member,
        Err(e) => {
            warn!("Identity lookup failed, continuing without member: {:#}", e);
            None
        }
    };

    let located = match locate_conversation(store, config, member.as_ref(), &forms).await {
        Ok(located) => located,
        Err(e) => {
            warn!("Conversation search failed, will provision: {:#}", e);
            None
        }
    };

    let conversation_id = match located {
        Some(id) => Some(id),
        None => provision_conversation(store, member.as_ref(), &forms, &sms.body).await,
    };

    let now = now_rfc3339();
    let message_id = store
        .insert_message(&NewMessage {
            provider_sid: &sms.provider_sid,
            direction: "inbound",
            from_number: &sms.from,
            to_number: &sms.to,
            body: &sms.body,
            status: "delivered",
            member_id: member.as_ref().map(|m| m.id.as_str()),
            conversation_id: conversation_id.as_deref(),
            delivered_at: &now,
        })
        .await?;

    // Recency marker moves only after the message row is committed
    if let Some(ref id) = conversation_id {
        if let Err(e) = store.touch_conversation(id, &now).await {
            warn!("Failed to refresh conversation timestamp: {:#}", e);
        }
    }

    info!(
        id = %message_id,
        member = member.as_ref().map(|m| m.id.as_str()).unwrap_or("-"),
        conversation = conversation_id.as_deref().unwrap_or("-"),
        "Recorded inbound message"
    );

    Ok(Resolution {
        message_id,
        conversation_id,
        member_id: member.map(|m| m.id),
    })
}

/// Fixed-priority member lookup: formatted form, raw input, digits-only,
/// local digits, then a linear digit-equality scan. The scan is a deliberate
/// O(n) worst case that only runs when every keyed lookup missed, because
/// stored numbers follow no single format.
async fn resolve_member(store: &Store, raw: &str, forms: &PhoneForms) -> Result<Option<Member>> {
    let keys = [
        forms.formatted.as_str(),
        raw,
        forms.digits.as_str(),
        forms.local_digits.as_str(),
    ];
    for key in keys {
        if key.is_empty() {
            continue;
        }
        if let Some(member) = store.member_by_phone(key).await? {
            debug!(member = %member.id, key, "Member matched by exact phone");
            return Ok(Some(member));
        }
    }

    for member in store.members_with_phone().await? {
        let Some(stored_raw) = member.phone.as_deref() else {
            continue;
        };
        let stored = phone::normalize(stored_raw);
        if stored.local_digits.is_empty() {
            continue;
        }
        if stored.digits == forms.digits
            || stored.local_digits == forms.local_digits
            || stored.digits == forms.local_digits
            || stored.local_digits == forms.digits
        {
            debug!(member = %member.id, "Member matched by digit-equality scan");
            return Ok(Some(member));
        }
    }

    Ok(None)
}

/// Pick at most one existing conversation for the inbound message.
///
/// Three strategies produce tagged candidates; one tie-break step picks the
/// winner. Identity-based matches (group, multi-recipient) suppress the
/// direct phone-number search entirely. The tie-break uses conversation
/// creation time, not last activity.
async fn locate_conversation(
    store: &Store,
    config: &SmsConfig,
    member: Option<&Member>,
    forms: &PhoneForms,
) -> Result<Option<String>> {
    let mut candidates: Vec<Candidate> = Vec::new();

    if let Some(member) = member {
        for (conversation_id, created_at) in
            store.group_conversations_for_member(&member.id).await?
        {
            candidates.push(Candidate {
                conversation_id,
                created_at,
                source: CandidateSource::Group,
            });
        }

        for (conversation_id, created_at) in store
            .broadcast_conversations_with_member(&config.broadcast_title_prefix, &member.id)
            .await?
        {
            candidates.push(Candidate {
                conversation_id,
                created_at,
                source: CandidateSource::MultiRecipient,
            });
        }
    }

    if candidates.is_empty() {
        for (conversation_id, created_at) in direct_history_search(store, config, forms).await? {
            candidates.push(Candidate {
                conversation_id,
                created_at,
                source: CandidateSource::Direct,
            });
        }
    }

    let best = candidates
        .into_iter()
        .max_by(|a, b| a.created_at.cmp(&b.created_at));

    if let Some(ref candidate) = best {
        debug!(
            conversation = %candidate.conversation_id,
            source = ?candidate.source,
            "Matched existing conversation"
        );
    }

    Ok(best.map(|c| c.conversation_id))
}

/// Direct-message history search: exact-string match on the three normalized
/// forms first, then a bounded scan of recent history comparing digits-only
/// equality for numbers stored in yet another format.
async fn direct_history_search(
    store: &Store,
    config: &SmsConfig,
    forms: &PhoneForms,
) -> Result<Vec<(String, String)>> {
    // Alphanumeric sender IDs normalize to empty forms, which would
    // exact-match history rows recorded with a blank number. Nothing to
    // search on, so the caller provisions a fresh thread.
    if forms.digits.is_empty() {
        return Ok(Vec::new());
    }

    let exact = store
        .conversations_by_exact_number([
            forms.formatted.as_str(),
            forms.digits.as_str(),
            forms.local_digits.as_str(),
        ])
        .await?;
    if !exact.is_empty() {
        return Ok(exact);
    }

    let mut matches = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for (conversation_id, from_number, to_number, created_at) in
        store.recent_message_numbers(config.history_scan_limit).await?
    {
        let from_digits = phone::digits_only(&from_number);
        let to_digits = phone::digits_only(&to_number);
        let hit = [from_digits.as_str(), to_digits.as_str()]
            .iter()
            .any(|d| *d == forms.digits || *d == forms.local_digits);
        if hit && seen.insert(conversation_id.clone()) {
            matches.push((conversation_id, created_at));
        }
    }

    Ok(matches)
}

/// Title for a lazily provisioned conversation: the member's name (or the
/// normalized phone when nobody matched), a colon, and the message body
/// truncated at 47 characters.
fn conversation_title(member: Option<&Member>, forms: &PhoneForms, body: &str) -> String {
    let label = member
        .map(|m| m.display_name())
        .unwrap_or_else(|| forms.formatted.clone());
    if body.chars().count() > 50 {
        let head: String = body.chars().take(47).collect();
        format!("{}: {}...", label, head)
    } else {
        format!("{}: {}", label, body)
    }
}

/// Create a new conversation for an unmatched message. Creation failure is
/// non-fatal: the message is still recorded with a null conversation.
async fn provision_conversation(
    store: &Store,
    member: Option<&Member>,
    forms: &PhoneForms,
    body: &str,
) -> Option<String> {
    let title = conversation_title(member, forms, body);
    match store.insert_conversation(&title, "general", None).await {
        Ok(id) => {
            info!(conversation = %id, title, "Provisioned new conversation");
            Some(id)
        }
        Err(e) => {
            error!("Failed to create conversation: {:#}", e);
            None
        }
    }
}
