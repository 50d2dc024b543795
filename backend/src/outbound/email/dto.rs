//! Request body posted to the email webhook.

use serde::Serialize;

use crate::domain::{EmailAddress, EmailTemplate, NotificationPayload};

#[derive(Debug, Serialize)]
pub(super) struct EmailRequestDto<'a> {
    pub(super) from: &'a str,
    pub(super) to: &'a str,
    pub(super) template: &'static str,
    pub(super) message: &'a str,
    pub(super) link: &'a str,
}

impl<'a> EmailRequestDto<'a> {
    pub(super) fn new(
        from: &'a str,
        to: &'a EmailAddress,
        template: EmailTemplate,
        payload: &'a NotificationPayload,
    ) -> Self {
        Self {
            from,
            to: to.as_str(),
            template: template.as_str(),
            message: payload.message.as_str(),
            link: payload.link.as_str(),
        }
    }
}
