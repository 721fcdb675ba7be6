mod test_chat_reaches_peer;
mod test_negotiation_through_relay;
mod test_repeated_member_joined;
